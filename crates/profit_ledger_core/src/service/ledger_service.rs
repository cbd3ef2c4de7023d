//! Ledger use-case service.
//!
//! # Responsibility
//! - Run one interaction: load, normalize, apply one mutation, persist.
//! - Quarantine unreadable or partially unreadable payloads and continue
//!   from whatever could be salvaged.
//! - Create months (next, specific, current) with inherited membership.
//!
//! # Invariants
//! - Every persisted tree is normalized.
//! - The tree revision always mirrors the store revision it was loaded from
//!   or saved as, so a stale tree is rejected with a conflict.
//! - Skipped edits and no-op month creation do not write.

use crate::calendar::weeks::{is_valid_period, month_display_key, next_period};
use crate::model::amount::Amount;
use crate::model::ledger::{EmployeeId, LedgerTree, Month};
use crate::repo::ledger_store::{LedgerStore, QuarantineRecord, StoreError};
use crate::service::aggregate::{month_summary, MonthSummary};
use crate::service::edits::{self, EditOutcome};
use crate::service::membership::{self, MembershipChange, MembershipError};
use crate::service::normalizer::{normalize_payload, normalize_value, NormalizeReport};
use chrono::{Datelike, Local, NaiveDate};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for ledger use-cases.
#[derive(Debug)]
pub enum LedgerServiceError {
    /// Persistence-layer failure, including revision conflicts.
    Store(StoreError),
    /// Membership input rejected.
    Membership(MembershipError),
    /// `(year, month)` is not a calendar month.
    InvalidPeriod { year: i32, month: u32 },
    /// Tree could not be re-read for normalization.
    Encode(String),
}

impl Display for LedgerServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Membership(err) => write!(f, "{err}"),
            Self::InvalidPeriod { year, month } => {
                write!(f, "invalid month: {year:04}-{month:02}")
            }
            Self::Encode(message) => write!(f, "failed to encode ledger: {message}"),
        }
    }
}

impl Error for LedgerServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Membership(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for LedgerServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<MembershipError> for LedgerServiceError {
    fn from(value: MembershipError) -> Self {
        Self::Membership(value)
    }
}

pub type LedgerServiceResult<T> = Result<T, LedgerServiceError>;

/// Use-case service over a ledger store.
pub struct LedgerService<S: LedgerStore> {
    store: S,
    today: Option<NaiveDate>,
}

impl<S: LedgerStore> LedgerService<S> {
    /// Creates a service that reads "today" from the local clock.
    pub fn new(store: S) -> Self {
        Self { store, today: None }
    }

    /// Pins "today", used for unresolvable month keys and current-month
    /// creation.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Loads and normalizes the stored ledger, reporting recovered issues.
    ///
    /// A payload that cannot be read in full is moved to quarantine and
    /// replaced by the salvaged ledger (empty when nothing was readable), in
    /// one store write.
    pub fn load_report(&self) -> LedgerServiceResult<NormalizeReport> {
        let stored = self.store.load()?;
        let mut report = normalize_payload(
            stored.as_ref().map(|document| document.payload.as_str()),
            self.today(),
        );

        if !report.issues.is_empty() {
            warn!(
                "event=ledger_load module=ledger_service status=recovered issues={}",
                report.issues.len()
            );
        }

        let stored_revision = stored.map(|document| document.revision).unwrap_or(0);
        report.tree.revision = match &report.quarantined {
            Some(quarantined) => self.store.quarantine_and_replace(
                &quarantined.payload,
                &quarantined.reason,
                &report.tree,
                stored_revision,
            )?,
            None => stored_revision,
        };
        info!(
            "event=ledger_load module=ledger_service status=ok revision={} months={} employees={}",
            report.tree.revision,
            report.tree.months.len(),
            report.tree.employees.len()
        );
        Ok(report)
    }

    /// Loads and normalizes the stored ledger.
    pub fn load(&self) -> LedgerServiceResult<LedgerTree> {
        Ok(self.load_report()?.tree)
    }

    /// Normalizes and persists `tree`, advancing its revision.
    ///
    /// Fails with a conflict when the store moved past `tree.revision`.
    pub fn save(&self, tree: &mut LedgerTree) -> LedgerServiceResult<u64> {
        let normalized = self.renormalize(tree)?;
        let revision = self.store.save(&normalized, tree.revision)?;
        *tree = normalized;
        tree.revision = revision;
        Ok(revision)
    }

    fn renormalize(&self, tree: &LedgerTree) -> LedgerServiceResult<LedgerTree> {
        let value =
            serde_json::to_value(tree).map_err(|err| LedgerServiceError::Encode(err.to_string()))?;
        let mut normalized = normalize_value(&value, self.today()).tree;
        normalized.revision = tree.revision;
        Ok(normalized)
    }

    /// Loads, applies `mutate`, and saves when it reports a change.
    fn transact<T>(
        &self,
        mutate: impl FnOnce(&mut LedgerTree) -> LedgerServiceResult<(T, bool)>,
    ) -> LedgerServiceResult<T> {
        let mut tree = self.load()?;
        let (outcome, changed) = mutate(&mut tree)?;
        if changed {
            self.save(&mut tree)?;
        }
        Ok(outcome)
    }

    /// Month keys in chronological order.
    pub fn months(&self) -> LedgerServiceResult<Vec<String>> {
        let tree = self.load()?;
        Ok(tree
            .months_chronological()
            .into_iter()
            .map(|(key, _)| key.to_string())
            .collect())
    }

    /// Creates the month after the latest one, or the current month for an
    /// empty ledger. Returns the new month key.
    pub fn add_next_month(&self) -> LedgerServiceResult<String> {
        let today = self.today();
        self.transact(|tree| {
            let period = tree
                .latest_month()
                .map(|(_, month)| next_period(month.period()))
                .unwrap_or((today.year(), today.month()));
            let key = insert_inherited_month(tree, period)?;
            Ok((key, true))
        })
    }

    /// Creates month `(year, month)` if it is missing.
    ///
    /// Returns the month key and whether it was created.
    pub fn ensure_month(&self, year: i32, month: u32) -> LedgerServiceResult<(String, bool)> {
        if !is_valid_period(year, month) {
            return Err(LedgerServiceError::InvalidPeriod { year, month });
        }
        self.transact(|tree| {
            if let Some(key) = tree.month_key_for_period((year, month)) {
                return Ok(((key.to_string(), false), false));
            }
            let key = insert_inherited_month(tree, (year, month))?;
            Ok(((key, true), true))
        })
    }

    /// Guarantees that at least one month exists, creating the current one.
    ///
    /// Returns the created key, or `None` when months already exist.
    pub fn ensure_current_month(&self) -> LedgerServiceResult<Option<String>> {
        let today = self.today();
        self.transact(|tree| {
            if !tree.months.is_empty() {
                return Ok((None, false));
            }
            let key = insert_inherited_month(tree, (today.year(), today.month()))?;
            Ok((Some(key), true))
        })
    }

    /// Adds `name` from `from_month_key` onward.
    pub fn add_employee(
        &self,
        from_month_key: &str,
        name: &str,
    ) -> LedgerServiceResult<MembershipChange> {
        self.transact(|tree| {
            let change = membership::add_employee(tree, from_month_key, name)?;
            let changed = !change.is_noop();
            Ok((change, changed))
        })
    }

    /// Removes `name` from `from_month_key` onward.
    pub fn remove_employee(
        &self,
        from_month_key: &str,
        name: &str,
    ) -> LedgerServiceResult<MembershipChange> {
        self.transact(|tree| {
            let change = membership::remove_employee(tree, from_month_key, name)?;
            let changed = !change.is_noop();
            Ok((change, changed))
        })
    }

    pub fn rename_employee(
        &self,
        current_name: &str,
        new_name: &str,
    ) -> LedgerServiceResult<EmployeeId> {
        self.transact(|tree| {
            let employee_id = membership::rename_employee(tree, current_name, new_name)?;
            Ok((employee_id, true))
        })
    }

    pub fn set_daily_profit(
        &self,
        month_key: &str,
        employee: &str,
        date: NaiveDate,
        amount: Amount,
    ) -> LedgerServiceResult<EditOutcome> {
        self.transact(|tree| {
            let outcome = edits::set_daily_profit(tree, month_key, employee, date, amount);
            let changed = outcome.is_applied();
            Ok((outcome, changed))
        })
    }

    pub fn set_plan(
        &self,
        month_key: &str,
        employee: &str,
        amount: Amount,
    ) -> LedgerServiceResult<EditOutcome> {
        self.transact(|tree| {
            let outcome = edits::set_plan(tree, month_key, employee, amount);
            let changed = outcome.is_applied();
            Ok((outcome, changed))
        })
    }

    /// Replaces the stored ledger with an empty one. Returns the new revision.
    pub fn clear(&self) -> LedgerServiceResult<u64> {
        let expected = self.store.load()?.map(|document| document.revision).unwrap_or(0);
        let revision = self.store.save(&LedgerTree::default(), expected)?;
        info!("event=ledger_clear module=ledger_service status=ok revision={revision}");
        Ok(revision)
    }

    /// Summary of one month, or `None` if it does not exist.
    pub fn summary(&self, month_key: &str) -> LedgerServiceResult<Option<MonthSummary>> {
        let tree = self.load()?;
        Ok(month_summary(&tree, month_key))
    }

    /// Payloads moved aside by earlier loads.
    pub fn quarantined(&self) -> LedgerServiceResult<Vec<QuarantineRecord>> {
        Ok(self.store.quarantined()?)
    }
}

/// Inserts month `period` with the members and plans of the nearest earlier
/// month. Returns the key of the month, existing or new.
fn insert_inherited_month(
    tree: &mut LedgerTree,
    period: (i32, u32),
) -> LedgerServiceResult<String> {
    let (year, month_number) = period;
    if !is_valid_period(year, month_number) {
        return Err(LedgerServiceError::InvalidPeriod {
            year,
            month: month_number,
        });
    }
    if let Some(key) = tree.month_key_for_period(period) {
        return Ok(key.to_string());
    }

    let mut month = Month::empty(year, month_number);
    if let Some((_, previous)) = tree.month_before(period) {
        for employee_id in &previous.employees {
            month.enroll(*employee_id);
            month.plans.insert(*employee_id, previous.plan_of(*employee_id));
        }
    }

    let key = month_display_key(year, month_number);
    info!(
        "event=month_create module=ledger_service status=ok period={year:04}-{month_number:02} inherited_employees={}",
        month.employees.len()
    );
    tree.months.insert(key.clone(), month);
    Ok(key)
}
