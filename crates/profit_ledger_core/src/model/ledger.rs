//! Ledger document model: months, weeks, employee registry.
//!
//! # Responsibility
//! - Define the canonical persisted shape of the profit ledger.
//! - Provide membership helpers that keep per-month invariants intact.
//!
//! # Invariants
//! - `Month::employees` holds unique ids; `plans` and every week's
//!   `daily_profits` only reference ids from that list.
//! - Weeks only store in-month dates.
//! - Registry display names are unique, compared trimmed and
//!   case-insensitively.
//!
//! # See also
//! - crate::service::normalizer for how arbitrary documents reach this shape.

use crate::calendar::weeks::{month_display_key, weeks_covering_month};
use crate::model::amount::Amount;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Schema version written into every canonical document.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Namespace for ids derived from legacy, name-keyed documents.
const LEGACY_EMPLOYEE_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2e_94d7_4a8e_b5a0_2f6c_d13e_8a47);

/// Stable surrogate identifier of an employee.
pub type EmployeeId = Uuid;

/// Per-employee daily values of one week: employee -> (date -> amount).
pub type DailyProfits = BTreeMap<EmployeeId, BTreeMap<NaiveDate, Amount>>;

/// Registry entry holding the renamable display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub name: String,
}

/// One Monday-to-Sunday week owned by a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Week {
    /// Anchor label derived from the Monday/Sunday span.
    pub label: String,
    pub daily_profits: DailyProfits,
}

/// One calendar month of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Month {
    pub year: i32,
    /// Calendar month, 1..=12.
    pub month: u32,
    /// Members in insertion order.
    pub employees: Vec<EmployeeId>,
    #[serde(rename = "employee_plans")]
    pub plans: BTreeMap<EmployeeId, Amount>,
    pub weeks: Vec<Week>,
}

impl Month {
    /// Creates a month with generated weeks and no members.
    pub fn empty(year: i32, month: u32) -> Self {
        let weeks = weeks_covering_month(year, month)
            .into_iter()
            .map(|week| Week {
                label: week.label(),
                daily_profits: BTreeMap::new(),
            })
            .collect();
        Self {
            year,
            month,
            employees: Vec::new(),
            plans: BTreeMap::new(),
            weeks,
        }
    }

    /// `(year, month)` pair used for chronological ordering.
    pub fn period(&self) -> (i32, u32) {
        (self.year, self.month)
    }

    /// Canonical display key for this month.
    pub fn display_key(&self) -> String {
        month_display_key(self.year, self.month)
    }

    pub fn contains_employee(&self, employee_id: EmployeeId) -> bool {
        self.employees.contains(&employee_id)
    }

    /// Returns whether `date` belongs to this calendar month.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Plan for one employee, zero when absent.
    pub fn plan_of(&self, employee_id: EmployeeId) -> Amount {
        self.plans.get(&employee_id).copied().unwrap_or_default()
    }

    /// Adds an employee with a zero plan and zeroed in-month days.
    ///
    /// Returns `false` when the employee is already a member.
    pub fn enroll(&mut self, employee_id: EmployeeId) -> bool {
        if self.contains_employee(employee_id) {
            return false;
        }
        self.employees.push(employee_id);
        self.plans.entry(employee_id).or_default();

        for calendar_week in weeks_covering_month(self.year, self.month) {
            let label = calendar_week.label();
            let Some(week) = self.weeks.iter_mut().find(|week| week.label == label) else {
                continue;
            };
            let days = week.daily_profits.entry(employee_id).or_default();
            for date in calendar_week.in_month_dates() {
                days.insert(date, Amount::ZERO);
            }
        }
        true
    }

    /// Drops an employee together with its plan and daily values.
    ///
    /// Returns `false` when the employee was not a member.
    pub fn withdraw(&mut self, employee_id: EmployeeId) -> bool {
        let was_member = self.contains_employee(employee_id);
        self.employees.retain(|id| *id != employee_id);
        self.plans.remove(&employee_id);
        for week in &mut self.weeks {
            week.daily_profits.remove(&employee_id);
        }
        was_member
    }

    /// Whether any month field still references `employee_id`.
    pub fn references(&self, employee_id: EmployeeId) -> bool {
        self.contains_employee(employee_id)
            || self.plans.contains_key(&employee_id)
            || self
                .weeks
                .iter()
                .any(|week| week.daily_profits.contains_key(&employee_id))
    }
}

/// Whole persisted ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTree {
    pub schema_version: u32,
    /// Monotonic write counter used for conflict detection.
    pub revision: u64,
    pub employees: BTreeMap<EmployeeId, EmployeeRecord>,
    /// Months keyed by display key.
    pub months: BTreeMap<String, Month>,
}

impl Default for LedgerTree {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            revision: 0,
            employees: BTreeMap::new(),
            months: BTreeMap::new(),
        }
    }
}

impl LedgerTree {
    pub fn month(&self, key: &str) -> Option<&Month> {
        self.months.get(key)
    }

    pub fn month_mut(&mut self, key: &str) -> Option<&mut Month> {
        self.months.get_mut(key)
    }

    /// Months ordered by `(year, month)`, ties broken by key.
    pub fn months_chronological(&self) -> Vec<(&str, &Month)> {
        let mut months: Vec<(&str, &Month)> = self
            .months
            .iter()
            .map(|(key, month)| (key.as_str(), month))
            .collect();
        months.sort_by(|(left_key, left), (right_key, right)| {
            left.period()
                .cmp(&right.period())
                .then_with(|| left_key.cmp(right_key))
        });
        months
    }

    /// Keys of months at or after `period`, chronologically.
    pub fn month_keys_from(&self, period: (i32, u32)) -> Vec<String> {
        self.months_chronological()
            .into_iter()
            .filter(|(_, month)| month.period() >= period)
            .map(|(key, _)| key.to_string())
            .collect()
    }

    /// Chronologically latest month.
    pub fn latest_month(&self) -> Option<(&str, &Month)> {
        self.months_chronological().into_iter().last()
    }

    /// Latest month strictly before `period`.
    pub fn month_before(&self, period: (i32, u32)) -> Option<(&str, &Month)> {
        self.months_chronological()
            .into_iter()
            .filter(|(_, month)| month.period() < period)
            .last()
    }

    /// First month with the given `(year, month)`.
    pub fn month_key_for_period(&self, period: (i32, u32)) -> Option<&str> {
        self.months_chronological()
            .into_iter()
            .find(|(_, month)| month.period() == period)
            .map(|(key, _)| key)
    }

    pub fn employee_name(&self, employee_id: EmployeeId) -> Option<&str> {
        self.employees
            .get(&employee_id)
            .map(|record| record.name.as_str())
    }

    /// Looks up an employee by display name (trimmed, case-insensitive).
    pub fn employee_id_by_name(&self, name: &str) -> Option<EmployeeId> {
        let wanted = name_lookup_key(name);
        self.employees
            .iter()
            .find(|(_, record)| name_lookup_key(&record.name) == wanted)
            .map(|(id, _)| *id)
    }

    /// Registers a new employee with a fresh id.
    ///
    /// Callers must check name uniqueness first.
    pub fn register_employee(&mut self, name: &str) -> EmployeeId {
        let employee_id = Uuid::new_v4();
        self.employees.insert(
            employee_id,
            EmployeeRecord {
                name: name.trim().to_string(),
            },
        );
        employee_id
    }

    /// Whether any month still references `employee_id`.
    pub fn is_referenced(&self, employee_id: EmployeeId) -> bool {
        self.months
            .values()
            .any(|month| month.references(employee_id))
    }
}

/// Trims a display name; `None` when nothing remains.
pub fn normalize_display_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Comparison key for display names.
pub fn name_lookup_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Deterministic id for an employee known only by name.
pub fn legacy_employee_id(name: &str) -> EmployeeId {
    Uuid::new_v5(&LEGACY_EMPLOYEE_NAMESPACE, name_lookup_key(name).as_bytes())
}
