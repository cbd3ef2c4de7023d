//! Core domain logic for the profit ledger.
//! This crate is the single source of truth for ledger invariants.

pub mod calendar;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use calendar::weeks::{month_display_key, parse_month_key, weeks_covering_month, CalendarWeek};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::amount::{Amount, ParseAmountError};
pub use model::ledger::{EmployeeId, EmployeeRecord, LedgerTree, Month, Week};
pub use repo::ledger_store::{
    LedgerStore, QuarantineRecord, SqliteLedgerStore, StoreError, StoreResult, StoredDocument,
};
pub use service::aggregate::{MonthSummary, PlanStatus, Progress};
pub use service::edits::{EditOutcome, SkipReason};
pub use service::ledger_service::{LedgerService, LedgerServiceError, LedgerServiceResult};
pub use service::membership::{MembershipChange, MembershipError};
pub use service::normalizer::{NormalizeIssue, NormalizeReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
