//! Persistence boundary for the ledger document.
//!
//! # Responsibility
//! - Define the `LedgerStore` contract the service layer talks to.
//! - Isolate SQLite details from normalization and propagation logic.
//!
//! # Invariants
//! - Store APIs surface write failures and revision conflicts as errors;
//!   they never swallow them.

pub mod ledger_store;
