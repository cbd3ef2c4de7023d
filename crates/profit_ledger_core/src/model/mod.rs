//! Domain model for the monthly profit ledger.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep one persisted document shape for months, weeks and plans.
//!
//! # Invariants
//! - Every employee is identified by a stable `EmployeeId`; display names are
//!   attributes, never keys.
//! - Amounts are fixed-point minor units.

pub mod amount;
pub mod ledger;
