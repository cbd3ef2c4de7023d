//! Reconciliation of arbitrary persisted documents into the canonical tree.
//!
//! # Responsibility
//! - Accept canonical and legacy (name-keyed, partial) document shapes.
//! - Rebuild every month's weeks from the calendar and carry forward values
//!   matched by `(week label, employee, date)`.
//! - Recover from shape problems locally, reporting them as issues.
//!
//! # Invariants
//! - Output satisfies every `LedgerTree` invariant.
//! - Normalization never invents a nonzero value.
//! - `normalize(serialize(normalize(x))) == normalize(x)`.
//! - Unreadable payloads are returned for quarantine, never dropped.
//! - The registry only keeps employees that are members of some month.

use crate::calendar::weeks::{is_valid_period, parse_month_key, weeks_covering_month};
use crate::logging::sanitize_message;
use crate::model::amount::Amount;
use crate::model::ledger::{
    legacy_employee_id, name_lookup_key, normalize_display_name, EmployeeId, EmployeeRecord,
    LedgerTree, Month, Week, CURRENT_SCHEMA_VERSION,
};
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MAX_LOGGED_KEY_CHARS: usize = 48;

/// Old week values keyed by label, then employee, then date.
type WeekValues = HashMap<String, HashMap<EmployeeId, HashMap<NaiveDate, Amount>>>;

/// Problem recovered during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeIssue {
    /// The payload could not be read; normalization started from empty.
    MalformedPersistedState { reason: String },
    /// A month key could not be parsed and had no explicit year/month.
    InvalidMonthKey {
        month_key: String,
        fallback: (i32, u32),
    },
    /// A top-level entry was not a month record and was skipped.
    IgnoredEntry { key: String },
}

impl NormalizeIssue {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedPersistedState { .. } => "malformed_persisted_state",
            Self::InvalidMonthKey { .. } => "invalid_month_key",
            Self::IgnoredEntry { .. } => "ignored_entry",
        }
    }
}

impl Display for NormalizeIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedPersistedState { reason } => {
                write!(f, "malformed persisted state: {reason}")
            }
            Self::InvalidMonthKey {
                month_key,
                fallback: (year, month),
            } => write!(
                f,
                "invalid month key `{month_key}`; using {year:04}-{month:02}"
            ),
            Self::IgnoredEntry { key } => write!(f, "ignored non-month entry `{key}`"),
        }
    }
}

/// Payload that could not be normalized and must be kept aside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedPayload {
    pub payload: String,
    pub reason: String,
}

/// Normalization result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub tree: LedgerTree,
    pub issues: Vec<NormalizeIssue>,
    pub quarantined: Option<QuarantinedPayload>,
}

impl NormalizeReport {
    fn empty() -> Self {
        Self {
            tree: LedgerTree::default(),
            issues: Vec::new(),
            quarantined: None,
        }
    }

    fn quarantine(payload: String, reason: String) -> Self {
        warn!(
            "event=normalize module=normalizer status=quarantined error_code=malformed_persisted_state payload_bytes={}",
            payload.len()
        );
        Self {
            tree: LedgerTree::default(),
            issues: vec![NormalizeIssue::MalformedPersistedState {
                reason: reason.clone(),
            }],
            quarantined: Some(QuarantinedPayload { payload, reason }),
        }
    }
}

/// Normalizes raw payload text; `None` or blank means nothing persisted.
pub fn normalize_payload(raw: Option<&str>, today: NaiveDate) -> NormalizeReport {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return NormalizeReport::empty();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => NormalizeReport::empty(),
        Ok(value @ Value::Object(_)) => {
            let mut report = normalize_value(&value, today);
            if let Some(quarantined) = report.quarantined.as_mut() {
                quarantined.payload = raw.to_string();
            }
            report
        }
        Ok(other) => NormalizeReport::quarantine(
            raw.to_string(),
            format!("expected a JSON object, got {}", json_kind(&other)),
        ),
        Err(err) => NormalizeReport::quarantine(raw.to_string(), format!("invalid JSON: {err}")),
    }
}

/// Normalizes an already parsed document.
///
/// `today` is only used when a month's period cannot be resolved.
pub fn normalize_value(value: &Value, today: NaiveDate) -> NormalizeReport {
    let root = match value {
        Value::Null => return NormalizeReport::empty(),
        Value::Object(root) => root,
        other => {
            return NormalizeReport::quarantine(
                other.to_string(),
                format!("expected a JSON object, got {}", json_kind(other)),
            )
        }
    };

    let document = DocumentView::classify(root);
    let mut issues = document.issues;
    let mut registry = RegistryBuilder::from_raw(document.registry, &mut issues);
    let mut months = BTreeMap::new();
    let empty_record = Map::new();

    for (key, entry) in document.months {
        let record = match entry {
            Value::Object(record) => record,
            Value::Null => &empty_record,
            _ => {
                issues.push(NormalizeIssue::IgnoredEntry { key: key.clone() });
                continue;
            }
        };
        let month = normalize_month(key, record, &mut registry, today, &mut issues);
        months.insert(key.clone(), month);
    }

    for issue in &issues {
        let subject = match issue {
            NormalizeIssue::InvalidMonthKey { month_key, .. } => month_key.as_str(),
            NormalizeIssue::IgnoredEntry { key } => key.as_str(),
            NormalizeIssue::MalformedPersistedState { .. } => "",
        };
        warn!(
            "event=normalize_issue module=normalizer status=recovered error_code={} key={}",
            issue.code(),
            sanitize_message(subject, MAX_LOGGED_KEY_CHARS)
        );
    }

    let members: HashSet<EmployeeId> = months
        .values()
        .flat_map(|month: &Month| month.employees.iter().copied())
        .collect();
    let mut employees = registry.into_records();
    employees.retain(|employee_id, _| members.contains(employee_id));

    let tree = LedgerTree {
        schema_version: CURRENT_SCHEMA_VERSION,
        revision: document.revision,
        employees,
        months,
    };
    debug!(
        "event=normalize module=normalizer status=ok legacy={} months={} employees={} issues={}",
        document.legacy,
        tree.months.len(),
        tree.employees.len(),
        issues.len()
    );

    let quarantined = salvage_reason(&issues).map(|reason| {
        warn!(
            "event=normalize module=normalizer status=quarantined error_code=partial_payload kept_months={}",
            tree.months.len()
        );
        QuarantinedPayload {
            payload: value.to_string(),
            reason,
        }
    });

    NormalizeReport {
        tree,
        issues,
        quarantined,
    }
}

/// Reason to keep the original payload when some of its content was dropped.
fn salvage_reason(issues: &[NormalizeIssue]) -> Option<String> {
    let dropped: Vec<String> = issues
        .iter()
        .filter(|issue| {
            matches!(
                issue,
                NormalizeIssue::IgnoredEntry { .. } | NormalizeIssue::MalformedPersistedState { .. }
            )
        })
        .map(ToString::to_string)
        .collect();
    (!dropped.is_empty()).then(|| format!("partially unreadable: {}", dropped.join("; ")))
}

/// Top-level split between canonical and legacy documents.
struct DocumentView<'a> {
    legacy: bool,
    revision: u64,
    registry: Option<&'a Map<String, Value>>,
    months: Vec<(&'a String, &'a Value)>,
    /// Top-level content that cannot be used.
    issues: Vec<NormalizeIssue>,
}

impl<'a> DocumentView<'a> {
    fn classify(root: &'a Map<String, Value>) -> Self {
        let canonical = root.contains_key("months") || root.contains_key("schema_version");
        if !canonical {
            return Self {
                legacy: true,
                revision: 0,
                registry: None,
                months: root.iter().collect(),
                issues: Vec::new(),
            };
        }

        let mut issues: Vec<NormalizeIssue> = root
            .keys()
            .filter(|key| !CANONICAL_KEYS.contains(&key.as_str()))
            .map(|key| NormalizeIssue::IgnoredEntry { key: key.clone() })
            .collect();
        let registry = object_field(root, "employees", &mut issues);
        let months = object_field(root, "months", &mut issues)
            .map(|months| months.iter().collect())
            .unwrap_or_default();

        Self {
            legacy: false,
            revision: root.get("revision").and_then(json_u64).unwrap_or(0),
            registry,
            months,
            issues,
        }
    }
}

const CANONICAL_KEYS: [&str; 4] = ["schema_version", "revision", "employees", "months"];

/// Reads an optional object field; any other non-null type is reported.
fn object_field<'a>(
    root: &'a Map<String, Value>,
    field: &str,
    issues: &mut Vec<NormalizeIssue>,
) -> Option<&'a Map<String, Value>> {
    match root.get(field) {
        Some(Value::Object(map)) => Some(map),
        None | Some(Value::Null) => None,
        Some(other) => {
            issues.push(NormalizeIssue::MalformedPersistedState {
                reason: format!("`{field}` must be an object, got {}", json_kind(other)),
            });
            None
        }
    }
}

/// Resolves employee references (ids or display names) to registry ids.
#[derive(Default)]
struct RegistryBuilder {
    records: BTreeMap<EmployeeId, EmployeeRecord>,
    by_name: HashMap<String, EmployeeId>,
    /// Ids whose display name duplicated an earlier entry.
    aliases: HashMap<EmployeeId, EmployeeId>,
}

impl RegistryBuilder {
    fn from_raw(raw: Option<&Map<String, Value>>, issues: &mut Vec<NormalizeIssue>) -> Self {
        let mut builder = Self::default();
        for (key, entry) in raw.into_iter().flatten() {
            let name = match entry {
                Value::String(name) => Some(name.as_str()),
                Value::Object(fields) => fields.get("name").and_then(Value::as_str),
                _ => None,
            };
            match (Uuid::parse_str(key.trim()), name.and_then(normalize_display_name)) {
                (Ok(employee_id), Some(name)) => builder.insert(employee_id, name),
                _ => issues.push(NormalizeIssue::MalformedPersistedState {
                    reason: format!("unreadable employee entry `{key}`"),
                }),
            }
        }
        builder
    }

    fn insert(&mut self, employee_id: EmployeeId, name: String) {
        if self.records.contains_key(&employee_id) {
            return;
        }
        let lookup = name_lookup_key(&name);
        match self.by_name.get(&lookup) {
            Some(existing) => {
                self.aliases.insert(employee_id, *existing);
            }
            None => {
                self.by_name.insert(lookup, employee_id);
                self.records.insert(employee_id, EmployeeRecord { name });
            }
        }
    }

    fn canonical(&self, employee_id: EmployeeId) -> EmployeeId {
        self.aliases.get(&employee_id).copied().unwrap_or(employee_id)
    }

    fn resolve(&mut self, reference: &str) -> Option<EmployeeId> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(employee_id) = Uuid::parse_str(trimmed) {
            let employee_id = self.canonical(employee_id);
            if !self.records.contains_key(&employee_id) {
                // Dangling id: keep its values under a placeholder name.
                self.insert(employee_id, employee_id.to_string());
            }
            return Some(self.canonical(employee_id));
        }

        if let Some(employee_id) = self.by_name.get(&name_lookup_key(trimmed)) {
            return Some(*employee_id);
        }

        let employee_id = legacy_employee_id(trimmed);
        if !self.records.contains_key(&employee_id) {
            self.insert(employee_id, trimmed.to_string());
        }
        Some(self.canonical(employee_id))
    }

    fn resolve_value(&mut self, reference: &Value) -> Option<EmployeeId> {
        match reference {
            Value::String(text) => self.resolve(text),
            Value::Object(fields) => fields
                .get("id")
                .or_else(|| fields.get("name"))
                .and_then(Value::as_str)
                .and_then(|text| self.resolve(text)),
            _ => None,
        }
    }

    fn into_records(self) -> BTreeMap<EmployeeId, EmployeeRecord> {
        self.records
    }
}

/// Insertion-ordered set of employee ids.
#[derive(Default)]
struct OrderedIds(Vec<EmployeeId>);

impl OrderedIds {
    fn push(&mut self, employee_id: EmployeeId) {
        if !self.0.contains(&employee_id) {
            self.0.push(employee_id);
        }
    }
}

fn normalize_month(
    key: &str,
    record: &Map<String, Value>,
    registry: &mut RegistryBuilder,
    today: NaiveDate,
    issues: &mut Vec<NormalizeIssue>,
) -> Month {
    let (year, month) = explicit_period(record)
        .or_else(|| parse_month_key(key))
        .unwrap_or_else(|| {
            let fallback = (today.year(), today.month());
            issues.push(NormalizeIssue::InvalidMonthKey {
                month_key: key.to_string(),
                fallback,
            });
            fallback
        });

    let mut referenced = OrderedIds::default();
    let old_plans = collect_plans(record, registry, &mut referenced);
    let old_weeks = collect_weeks(record, registry, &mut referenced);
    let employees = match record.get("employees") {
        Some(Value::Array(items)) => {
            let mut listed = OrderedIds::default();
            for item in items {
                if let Some(employee_id) = registry.resolve_value(item) {
                    listed.push(employee_id);
                }
            }
            listed.0
        }
        _ => referenced.0,
    };

    let plans = employees
        .iter()
        .map(|id| (*id, old_plans.get(id).copied().unwrap_or_default()))
        .collect();

    let weeks = weeks_covering_month(year, month)
        .into_iter()
        .map(|calendar_week| {
            let label = calendar_week.label();
            let previous = old_weeks.get(&label);
            let days = calendar_week.in_month_dates();
            let daily_profits = employees
                .iter()
                .map(|id| {
                    let previous_days = previous.and_then(|week| week.get(id));
                    let values = days
                        .iter()
                        .map(|date| {
                            let carried = previous_days
                                .and_then(|values| values.get(date))
                                .copied()
                                .unwrap_or(Amount::ZERO);
                            (*date, carried)
                        })
                        .collect();
                    (*id, values)
                })
                .collect();
            Week {
                label,
                daily_profits,
            }
        })
        .collect();

    Month {
        year,
        month,
        employees,
        plans,
        weeks,
    }
}

fn explicit_period(record: &Map<String, Value>) -> Option<(i32, u32)> {
    let year = i32::try_from(json_i64(record.get("year")?)?).ok()?;
    let month = u32::try_from(json_i64(record.get("month")?)?).ok()?;
    is_valid_period(year, month).then_some((year, month))
}

fn collect_plans(
    record: &Map<String, Value>,
    registry: &mut RegistryBuilder,
    referenced: &mut OrderedIds,
) -> HashMap<EmployeeId, Amount> {
    let mut plans = HashMap::new();
    let raw = record
        .get("employee_plans")
        .or_else(|| record.get("plans"))
        .and_then(Value::as_object);

    for (employee_ref, value) in raw.into_iter().flatten() {
        let Some(employee_id) = registry.resolve(employee_ref) else {
            continue;
        };
        referenced.push(employee_id);
        if let Some(amount) = json_amount(value) {
            plans.entry(employee_id).or_insert(amount);
        }
    }
    plans
}

fn collect_weeks(
    record: &Map<String, Value>,
    registry: &mut RegistryBuilder,
    referenced: &mut OrderedIds,
) -> WeekValues {
    let entries: Vec<(&str, &Map<String, Value>)> = match record.get("weeks") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let week = item.as_object()?;
                let label = week.get("label")?.as_str()?;
                Some((label, week.get("daily_profits")?.as_object()?))
            })
            .collect(),
        Some(Value::Object(by_label)) => by_label
            .iter()
            .filter_map(|(label, item)| {
                let week = item.as_object()?;
                let label = week
                    .get("label")
                    .and_then(Value::as_str)
                    .unwrap_or(label.as_str());
                Some((label, week.get("daily_profits")?.as_object()?))
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut weeks = WeekValues::new();
    for (label, daily_profits) in entries {
        let week = weeks.entry(label.trim().to_string()).or_default();
        for (employee_ref, days) in daily_profits {
            let Some(employee_id) = registry.resolve(employee_ref) else {
                continue;
            };
            referenced.push(employee_id);
            let slot = week.entry(employee_id).or_default();
            for (date_text, value) in days.as_object().into_iter().flatten() {
                let (Some(date), Some(amount)) = (parse_date(date_text), json_amount(value)) else {
                    continue;
                };
                slot.entry(date).or_insert(amount);
            }
        }
    }
    weeks
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(trimmed.get(..10)?, "%Y-%m-%d").ok())
}

fn json_amount(value: &Value) -> Option<Amount> {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(whole) => Some(Amount::from_major_units(whole)),
            None => number.as_f64().and_then(Amount::from_major_f64),
        },
        Value::String(text) => text.parse::<Amount>().ok(),
        _ => None,
    }
}

fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn json_u64(value: &Value) -> Option<u64> {
    json_i64(value).and_then(|signed| u64::try_from(signed).ok())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
