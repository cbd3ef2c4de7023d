//! Ledger engine and use-case services.
//!
//! # Responsibility
//! - Normalize persisted documents into the canonical ledger tree.
//! - Propagate membership, apply edits and project totals.
//! - Orchestrate store calls into one-shot use-case APIs.

pub mod aggregate;
pub mod edits;
pub mod ledger_service;
pub mod membership;
pub mod normalizer;
