//! Forward-only employee membership propagation.
//!
//! # Responsibility
//! - Add or remove an employee in a start month and every later month.
//! - Rename employees without touching plans or daily values.
//!
//! # Invariants
//! - Months before the start month are never modified.
//! - Month scope is decided by `(year, month)` comparison only.
//! - Adding never overwrites an existing member's plan or values.
//! - Registry entries no longer referenced by any month are dropped.

use crate::calendar::weeks::parse_month_key;
use crate::model::ledger::{normalize_display_name, EmployeeId, LedgerTree};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from membership operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// Display name is blank after trim.
    InvalidEmployeeName,
    /// Start month is neither in the tree nor a parseable month key.
    UnresolvedMonth(String),
    /// Rename target is already used by another employee.
    DuplicateEmployeeName(String),
    /// Rename source does not exist.
    UnknownEmployee(String),
}

impl Display for MembershipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmployeeName => write!(f, "employee name must not be blank"),
            Self::UnresolvedMonth(key) => write!(f, "cannot resolve month `{key}`"),
            Self::DuplicateEmployeeName(name) => {
                write!(f, "employee name already in use: `{name}`")
            }
            Self::UnknownEmployee(name) => write!(f, "employee not found: `{name}`"),
        }
    }
}

impl Error for MembershipError {}

/// Effect of one add/remove call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// Target employee; `None` when the name matched nobody.
    pub employee_id: Option<EmployeeId>,
    /// Keys of months that changed, chronologically.
    pub affected_months: Vec<String>,
}

impl MembershipChange {
    fn untouched(employee_id: Option<EmployeeId>) -> Self {
        Self {
            employee_id,
            affected_months: Vec::new(),
        }
    }

    /// True when no month changed.
    pub fn is_noop(&self) -> bool {
        self.affected_months.is_empty()
    }
}

/// Resolves the start month of a propagation.
///
/// A key present in the tree wins; otherwise the key is parsed.
pub fn resolve_start_period(
    tree: &LedgerTree,
    from_month_key: &str,
) -> Result<(i32, u32), MembershipError> {
    tree.month(from_month_key)
        .map(|month| month.period())
        .or_else(|| parse_month_key(from_month_key))
        .ok_or_else(|| MembershipError::UnresolvedMonth(from_month_key.to_string()))
}

/// Adds `name` to the start month and every later month.
///
/// An existing employee with the same display name is reused; otherwise a
/// new id is registered. Months already containing the employee are left
/// as they are.
pub fn add_employee(
    tree: &mut LedgerTree,
    from_month_key: &str,
    name: &str,
) -> Result<MembershipChange, MembershipError> {
    let name = normalize_display_name(name).ok_or(MembershipError::InvalidEmployeeName)?;
    let start = resolve_start_period(tree, from_month_key)?;

    let existing = tree.employee_id_by_name(&name);
    let employee_id = existing.unwrap_or_else(|| tree.register_employee(&name));

    let mut affected_months = Vec::new();
    for key in tree.month_keys_from(start) {
        let Some(month) = tree.month_mut(&key) else {
            continue;
        };
        if month.enroll(employee_id) {
            affected_months.push(key);
        }
    }

    if existing.is_none() && affected_months.is_empty() {
        tree.employees.remove(&employee_id);
        return Ok(MembershipChange::untouched(None));
    }

    info!(
        "event=employee_add module=membership status=ok start={:04}-{:02} affected_months={}",
        start.0,
        start.1,
        affected_months.len()
    );
    Ok(MembershipChange {
        employee_id: Some(employee_id),
        affected_months,
    })
}

/// Removes `name` from the start month and every later month.
///
/// Unknown names are a no-op. Earlier months keep their data.
pub fn remove_employee(
    tree: &mut LedgerTree,
    from_month_key: &str,
    name: &str,
) -> Result<MembershipChange, MembershipError> {
    let start = resolve_start_period(tree, from_month_key)?;
    let Some(employee_id) = tree.employee_id_by_name(name) else {
        warn!(
            "event=employee_remove module=membership status=skipped error_code=missing_employee_reference"
        );
        return Ok(MembershipChange::untouched(None));
    };

    let mut affected_months = Vec::new();
    for key in tree.month_keys_from(start) {
        let Some(month) = tree.month_mut(&key) else {
            continue;
        };
        if month.withdraw(employee_id) {
            affected_months.push(key);
        }
    }

    if !tree.is_referenced(employee_id) {
        tree.employees.remove(&employee_id);
    }

    info!(
        "event=employee_remove module=membership status=ok start={:04}-{:02} affected_months={}",
        start.0,
        start.1,
        affected_months.len()
    );
    Ok(MembershipChange {
        employee_id: Some(employee_id),
        affected_months,
    })
}

/// Changes an employee's display name; ids and data stay as they are.
pub fn rename_employee(
    tree: &mut LedgerTree,
    current_name: &str,
    new_name: &str,
) -> Result<EmployeeId, MembershipError> {
    let new_name = normalize_display_name(new_name).ok_or(MembershipError::InvalidEmployeeName)?;
    let employee_id = tree
        .employee_id_by_name(current_name)
        .ok_or_else(|| MembershipError::UnknownEmployee(current_name.trim().to_string()))?;

    match tree.employee_id_by_name(&new_name) {
        Some(other) if other != employee_id => {
            return Err(MembershipError::DuplicateEmployeeName(new_name));
        }
        _ => {}
    }

    if let Some(record) = tree.employees.get_mut(&employee_id) {
        record.name = new_name;
    }
    info!("event=employee_rename module=membership status=ok");
    Ok(employee_id)
}
