//! Explicit value edits on a normalized tree.
//!
//! # Responsibility
//! - Set one employee's daily profit or monthly plan.
//!
//! # Invariants
//! - Edits never add members; targeting a non-member is a skipped no-op.
//! - Only in-month dates can be edited.

use crate::model::amount::Amount;
use crate::model::ledger::LedgerTree;
use chrono::NaiveDate;
use log::warn;
use std::fmt::{Display, Formatter};

/// Why an edit was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnknownMonth(String),
    MissingEmployeeReference { month_key: String, employee: String },
    DateOutsideMonth { month_key: String, date: NaiveDate },
}

impl SkipReason {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownMonth(_) => "unknown_month",
            Self::MissingEmployeeReference { .. } => "missing_employee_reference",
            Self::DateOutsideMonth { .. } => "date_outside_month",
        }
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMonth(key) => write!(f, "month not found: `{key}`"),
            Self::MissingEmployeeReference {
                month_key,
                employee,
            } => write!(f, "`{employee}` is not a member of `{month_key}`"),
            Self::DateOutsideMonth { month_key, date } => {
                write!(f, "{date} is not a day of `{month_key}`")
            }
        }
    }
}

/// Result of an edit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Skipped(SkipReason),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    fn skipped(reason: SkipReason) -> Self {
        warn!(
            "event=ledger_edit module=edits status=skipped error_code={}",
            reason.code()
        );
        Self::Skipped(reason)
    }
}

/// Sets the daily profit of `employee` on `date` in month `month_key`.
pub fn set_daily_profit(
    tree: &mut LedgerTree,
    month_key: &str,
    employee: &str,
    date: NaiveDate,
    amount: Amount,
) -> EditOutcome {
    let employee_id = tree.employee_id_by_name(employee);
    let Some(month) = tree.month_mut(month_key) else {
        return EditOutcome::skipped(SkipReason::UnknownMonth(month_key.to_string()));
    };
    let Some(employee_id) = employee_id.filter(|id| month.contains_employee(*id)) else {
        return EditOutcome::skipped(SkipReason::MissingEmployeeReference {
            month_key: month_key.to_string(),
            employee: employee.trim().to_string(),
        });
    };
    if !month.contains_date(date) {
        return EditOutcome::skipped(SkipReason::DateOutsideMonth {
            month_key: month_key.to_string(),
            date,
        });
    }

    let slot = month
        .weeks
        .iter_mut()
        .filter_map(|week| week.daily_profits.get_mut(&employee_id))
        .find_map(|days| days.get_mut(&date));
    match slot {
        Some(value) => {
            *value = amount;
            EditOutcome::Applied
        }
        // A normalized member has every in-month day; a gap means the tree
        // was not normalized.
        None => EditOutcome::skipped(SkipReason::DateOutsideMonth {
            month_key: month_key.to_string(),
            date,
        }),
    }
}

/// Sets the monthly plan of `employee` in month `month_key`.
pub fn set_plan(
    tree: &mut LedgerTree,
    month_key: &str,
    employee: &str,
    amount: Amount,
) -> EditOutcome {
    let employee_id = tree.employee_id_by_name(employee);
    let Some(month) = tree.month_mut(month_key) else {
        return EditOutcome::skipped(SkipReason::UnknownMonth(month_key.to_string()));
    };
    let Some(employee_id) = employee_id.filter(|id| month.contains_employee(*id)) else {
        return EditOutcome::skipped(SkipReason::MissingEmployeeReference {
            month_key: month_key.to_string(),
            employee: employee.trim().to_string(),
        });
    };

    month.plans.insert(employee_id, amount);
    EditOutcome::Applied
}
