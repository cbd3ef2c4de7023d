use chrono::NaiveDate;
use profit_ledger_core::db::open_db_in_memory;
use profit_ledger_core::{
    Amount, LedgerService, LedgerServiceError, LedgerStore, PlanStatus, Progress,
    SqliteLedgerStore, StoreError,
};
use rusqlite::{params, Connection};
use serde_json::{json, Value};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn seed(conn: &Connection, revision: i64, payload: &str) {
    conn.execute(
        "INSERT INTO ledger_document (id, revision, payload) VALUES (1, ?1, ?2);",
        params![revision, payload],
    )
    .unwrap();
}

fn stored_value(store: &SqliteLedgerStore<'_>) -> Value {
    let document = store.load().unwrap().unwrap();
    serde_json::from_str(&document.payload).unwrap()
}

#[test]
fn fresh_database_starts_with_current_month() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    assert!(service.load().unwrap().months.is_empty());
    assert_eq!(
        service.ensure_current_month().unwrap().as_deref(),
        Some("January 2026")
    );
    assert_eq!(service.months().unwrap(), vec!["January 2026"]);
    assert_eq!(stored_value(&store)["schema_version"], 2);
}

#[test]
fn idle_round_trip_reproduces_normalized_tree() {
    let mut conn = open_db_in_memory().unwrap();
    let legacy = json!({
        "January 2026": {
            "employees": ["Ann", "Bob"],
            "employee_plans": {"Ann": 300},
            "weeks": [
                {"label": "2025-12-29/2026-01-04", "daily_profits": {"Ann": {"2026-01-01": 50}}}
            ]
        }
    });
    seed(&conn, 1, &legacy.to_string());
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    let mut tree = service.load().unwrap();
    assert_eq!(tree.revision, 1);
    let first = tree.clone();

    assert_eq!(service.save(&mut tree).unwrap(), 2);
    let reloaded = service.load().unwrap();
    assert_eq!(reloaded.revision, 2);
    assert_eq!(reloaded.employees, first.employees);
    assert_eq!(reloaded.months, first.months);
}

#[test]
fn stale_tree_is_rejected_and_store_keeps_winner() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());
    service.ensure_month(2026, 1).unwrap();

    let mut first = service.load().unwrap();
    let mut second = service.load().unwrap();
    first.months.get_mut("January 2026").unwrap().plans.clear();
    service.save(&mut first).unwrap();
    let winner = store.load().unwrap().unwrap();

    let err = service.save(&mut second).unwrap_err();
    assert!(matches!(
        err,
        LedgerServiceError::Store(StoreError::Conflict {
            expected: 1,
            actual: 2
        })
    ));
    assert_eq!(store.load().unwrap().unwrap(), winner);
    assert_eq!(second.revision, 1);
}

#[test]
fn unreadable_payload_is_quarantined_once_and_replaced() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&conn, 3, "{\"January 2026\": ");
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    let report = service.load_report().unwrap();
    assert!(report.tree.months.is_empty());
    assert_eq!(report.tree.revision, 4);
    assert_eq!(report.issues.len(), 1);
    assert!(stored_value(&store)["months"].as_object().unwrap().is_empty());

    // A second load finds the replacement, not the bad payload.
    assert!(service.load_report().unwrap().issues.is_empty());
    let quarantined = service.quarantined().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].payload, "{\"January 2026\": ");
}

#[test]
fn non_object_months_are_quarantined_once() {
    let mut conn = open_db_in_memory().unwrap();
    let raw = r#"{"January 2026": "Ann:50,Bob:70", "February 2026": [1,2,3]}"#;
    seed(&conn, 1, raw);
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    let report = service.load_report().unwrap();
    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.tree.revision, 2);
    assert!(stored_value(&store)["months"].as_object().unwrap().is_empty());

    assert!(service.load_report().unwrap().issues.is_empty());
    service.ensure_current_month().unwrap();
    let quarantined = service.quarantined().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].payload, raw);
}

#[test]
fn canonical_months_array_is_quarantined() {
    let mut conn = open_db_in_memory().unwrap();
    let raw = r#"{"schema_version":2,"months":[{"year":2026,"month":1}]}"#;
    seed(&conn, 5, raw);
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    let report = service.load_report().unwrap();
    assert!(report.tree.months.is_empty());
    assert_eq!(report.tree.revision, 6);
    assert!(report.issues[0].to_string().contains("`months` must be an object"));

    let quarantined = service.quarantined().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].payload, raw);
    assert!(quarantined[0].reason.contains("`months`"));
}

#[test]
fn readable_months_are_kept_when_payload_is_partly_unreadable() {
    let mut conn = open_db_in_memory().unwrap();
    let raw = r#"{"March 2025": {"employees": ["Ann"]}, "notes": "x"}"#;
    seed(&conn, 2, raw);
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    let report = service.load_report().unwrap();
    assert_eq!(report.tree.revision, 3);
    assert!(report.tree.month("March 2025").is_some());
    assert_eq!(stored_value(&store)["months"]["March 2025"]["year"], 2025);

    assert_eq!(
        service.ensure_current_month().unwrap().as_deref(),
        Some("January 2026")
    );
    assert_eq!(service.months().unwrap(), vec!["March 2025", "January 2026"]);
    let quarantined = service.quarantined().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].payload, raw);
}

#[test]
fn add_employee_propagates_forward_only() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());
    for month in 2..=5 {
        service.ensure_month(2025, month).unwrap();
    }

    let change = service.add_employee("March 2025", "Carol").unwrap();
    let carol = change.employee_id.unwrap();
    assert_eq!(
        change.affected_months,
        vec!["March 2025", "April 2025", "May 2025"]
    );

    let tree = service.load().unwrap();
    assert!(!tree.month("February 2025").unwrap().contains_employee(carol));
    for key in ["March 2025", "April 2025", "May 2025"] {
        assert!(tree.month(key).unwrap().contains_employee(carol), "{key}");
    }
}

#[test]
fn remove_employee_keeps_earlier_values() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());
    service.ensure_month(2025, 3).unwrap();
    service.add_employee("March 2025", "Bob").unwrap();
    service
        .set_daily_profit("March 2025", "Bob", ymd(2025, 3, 12), Amount::from_major_units(40))
        .unwrap();
    service.add_next_month().unwrap();
    service.add_next_month().unwrap();

    let change = service.remove_employee("April 2025", "Bob").unwrap();
    assert_eq!(change.affected_months, vec!["April 2025", "May 2025"]);

    let march = service.summary("March 2025").unwrap().unwrap();
    assert_eq!(march.employees.len(), 1);
    assert_eq!(march.employees[0].name, "Bob");
    assert_eq!(march.employees[0].total, Amount::from_major_units(40));
    let april = service.summary("April 2025").unwrap().unwrap();
    assert!(april.employees.is_empty());
}

#[test]
fn summary_reports_weekly_totals_and_progress() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());
    service.ensure_current_month().unwrap();
    service.add_employee("January 2026", "Ann").unwrap();
    service.add_employee("January 2026", "Bob").unwrap();
    service
        .set_plan("January 2026", "Ann", Amount::from_major_units(300))
        .unwrap();
    service
        .set_daily_profit("January 2026", "Ann", ymd(2026, 1, 1), Amount::from_major_units(50))
        .unwrap();
    service
        .set_daily_profit("January 2026", "Ann", ymd(2026, 1, 8), Amount::from_major_units(70))
        .unwrap();

    let summary = service.summary("January 2026").unwrap().unwrap();
    assert_eq!(summary.weeks.len(), 5);
    assert_eq!(summary.weeks[0].label, "2025-12-29/2026-01-04");
    assert_eq!(summary.weeks[0].total, Amount::from_major_units(50));
    assert_eq!(summary.weeks[1].total, Amount::from_major_units(70));
    assert_eq!(summary.actual_total, Amount::from_major_units(120));
    assert_eq!(summary.plan_total, Amount::from_major_units(300));

    let ann = &summary.employees[0];
    assert_eq!(ann.name, "Ann");
    assert_eq!(ann.progress.percent(), Some(40.0));
    assert_eq!(ann.status, PlanStatus::Behind);
    let bob = &summary.employees[1];
    assert_eq!(bob.progress, Progress::NoTarget);

    assert!(service.summary("June 1999").unwrap().is_none());
}

#[test]
fn legacy_name_keyed_document_upgrades_on_save() {
    let mut conn = open_db_in_memory().unwrap();
    let legacy = json!({
        "December 2025": {
            "employees": ["Dee"],
            "employee_plans": {"Dee": 100.5},
            "weeks": [
                {"label": "2025-12-01/2025-12-07", "daily_profits": {"Dee": {"2025-12-03": 12.25}}}
            ]
        }
    });
    seed(&conn, 1, &legacy.to_string());
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());

    assert_eq!(service.add_next_month().unwrap(), "January 2026");

    let value = stored_value(&store);
    assert_eq!(value["schema_version"], 2);
    assert_eq!(value["revision"], 2);
    let employees = value["employees"].as_object().unwrap();
    assert_eq!(employees.len(), 1);
    let (dee_id, record) = employees.iter().next().unwrap();
    assert_eq!(record["name"], "Dee");

    let december = &value["months"]["December 2025"];
    assert_eq!(december["employee_plans"][dee_id], 100.5);
    assert_eq!(
        december["weeks"][0]["daily_profits"][dee_id]["2025-12-03"],
        12.25
    );
    let january = &value["months"]["January 2026"];
    assert_eq!(january["employees"][0], dee_id.as_str());
    assert_eq!(january["employee_plans"][dee_id], 100.5);
}

#[test]
fn rename_keeps_values_under_new_name() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());
    service.ensure_current_month().unwrap();
    service.add_employee("January 2026", "Ann").unwrap();
    service
        .set_plan("January 2026", "Ann", Amount::from_major_units(10))
        .unwrap();

    service.rename_employee("Ann", "Annabel").unwrap();
    let summary = service.summary("January 2026").unwrap().unwrap();
    assert_eq!(summary.employees[0].name, "Annabel");
    assert_eq!(summary.employees[0].plan, Amount::from_major_units(10));
}

#[test]
fn clear_stores_an_empty_ledger_with_next_revision() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let service = LedgerService::new(&store).with_today(today());
    service.ensure_current_month().unwrap();

    assert_eq!(service.clear().unwrap(), 2);
    let tree = service.load().unwrap();
    assert!(tree.months.is_empty());
    assert_eq!(tree.revision, 2);
}
