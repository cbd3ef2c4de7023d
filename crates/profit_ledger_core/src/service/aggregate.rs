//! Read-only totals and plan progress over a normalized month.
//!
//! # Responsibility
//! - Weekly, per-employee and monthly sums of daily profits.
//! - Plan totals and progress against plan.
//!
//! # Invariants
//! - Functions here never mutate state.
//! - Missing weeks, employees or dates count as zero.
//! - Only in-month dates are summed, even if a tree carries others.

use crate::model::amount::Amount;
use crate::model::ledger::{EmployeeId, LedgerTree, Month, Week};

/// Achievement against a monthly plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Plan is zero or negative; there is nothing to measure against.
    NoTarget,
    OfTarget { achieved: Amount, target: Amount },
}

impl Progress {
    /// `achieved / target`, or `None` without a target.
    pub fn ratio(&self) -> Option<f64> {
        match self {
            Self::NoTarget => None,
            Self::OfTarget { achieved, target } => {
                Some(achieved.minor_units() as f64 / target.minor_units() as f64)
            }
        }
    }

    /// Ratio expressed in percent.
    pub fn percent(&self) -> Option<f64> {
        self.ratio().map(|ratio| ratio * 100.0)
    }

    pub fn has_target(&self) -> bool {
        matches!(self, Self::OfTarget { .. })
    }
}

/// Traffic-light status of an employee against plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    Met,
    Behind,
    NoTarget,
}

/// One week row of a month summary.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekSummary {
    pub label: String,
    pub total: Amount,
}

/// One employee row of a month summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeSummary {
    pub employee_id: EmployeeId,
    pub name: String,
    pub plan: Amount,
    pub weekly_totals: Vec<Amount>,
    pub total: Amount,
    pub progress: Progress,
    pub status: PlanStatus,
}

/// Display-ready projection of one month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthSummary {
    pub month_key: String,
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<WeekSummary>,
    pub employees: Vec<EmployeeSummary>,
    pub plan_total: Amount,
    pub actual_total: Amount,
}

fn week_values<'a>(
    month: &'a Month,
    week: &'a Week,
    employee_id: EmployeeId,
) -> impl Iterator<Item = Amount> + 'a {
    week.daily_profits
        .get(&employee_id)
        .into_iter()
        .flatten()
        .filter(|(date, _)| month.contains_date(**date))
        .map(|(_, amount)| *amount)
}

/// Sum of all members' in-month values of week `week_index` (0-based).
pub fn weekly_total(month: &Month, week_index: usize) -> Amount {
    month
        .employees
        .iter()
        .map(|employee_id| employee_weekly_total(month, week_index, *employee_id))
        .sum()
}

/// One employee's in-month values of week `week_index` (0-based).
pub fn employee_weekly_total(month: &Month, week_index: usize, employee_id: EmployeeId) -> Amount {
    month
        .weeks
        .get(week_index)
        .map(|week| week_values(month, week, employee_id).sum())
        .unwrap_or_default()
}

/// One employee's in-month values across all weeks.
pub fn employee_monthly_total(month: &Month, employee_id: EmployeeId) -> Amount {
    month
        .weeks
        .iter()
        .flat_map(|week| week_values(month, week, employee_id))
        .sum()
}

/// All members' values across the month.
pub fn monthly_total(month: &Month) -> Amount {
    month
        .employees
        .iter()
        .map(|employee_id| employee_monthly_total(month, *employee_id))
        .sum()
}

/// Sum of plans over current members.
pub fn monthly_plan_total(month: &Month) -> Amount {
    month
        .employees
        .iter()
        .map(|employee_id| month.plan_of(*employee_id))
        .sum()
}

/// Progress of one employee against their plan.
pub fn progress(month: &Month, employee_id: EmployeeId) -> Progress {
    let target = month.plan_of(employee_id);
    if !target.is_positive() {
        return Progress::NoTarget;
    }
    Progress::OfTarget {
        achieved: employee_monthly_total(month, employee_id),
        target,
    }
}

/// Plan status of one employee.
pub fn plan_status(month: &Month, employee_id: EmployeeId) -> PlanStatus {
    match progress(month, employee_id) {
        Progress::NoTarget => PlanStatus::NoTarget,
        Progress::OfTarget { achieved, target } if achieved >= target => PlanStatus::Met,
        Progress::OfTarget { .. } => PlanStatus::Behind,
    }
}

/// Builds the summary of month `month_key`, or `None` if it does not exist.
pub fn month_summary(tree: &LedgerTree, month_key: &str) -> Option<MonthSummary> {
    let month = tree.month(month_key)?;

    let weeks = month
        .weeks
        .iter()
        .enumerate()
        .map(|(index, week)| WeekSummary {
            label: week.label.clone(),
            total: weekly_total(month, index),
        })
        .collect();

    let employees = month
        .employees
        .iter()
        .map(|employee_id| {
            let employee_id = *employee_id;
            EmployeeSummary {
                employee_id,
                name: tree
                    .employee_name(employee_id)
                    .map(str::to_string)
                    .unwrap_or_else(|| employee_id.to_string()),
                plan: month.plan_of(employee_id),
                weekly_totals: (0..month.weeks.len())
                    .map(|index| employee_weekly_total(month, index, employee_id))
                    .collect(),
                total: employee_monthly_total(month, employee_id),
                progress: progress(month, employee_id),
                status: plan_status(month, employee_id),
            }
        })
        .collect();

    Some(MonthSummary {
        month_key: month_key.to_string(),
        year: month.year,
        month: month.month,
        weeks,
        employees,
        plan_total: monthly_plan_total(month),
        actual_total: monthly_total(month),
    })
}
