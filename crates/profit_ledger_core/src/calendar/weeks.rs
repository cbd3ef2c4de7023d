//! Monday-aligned week generation for calendar months.
//!
//! # Responsibility
//! - Produce the ordered weeks that overlap a month.
//! - Derive stable week labels used to match weeks across regenerations.
//! - Parse and format month display keys (`"January 2026"`).
//!
//! # Invariants
//! - Every date of the month falls in exactly one generated week.
//! - Each week spans seven consecutive days, Monday through Sunday.
//! - A week label depends only on its Monday/Sunday dates.

use chrono::{Datelike, Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_MONTH_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").expect("valid iso month regex"));

const DAYS_PER_WEEK: u64 = 7;
const MONTH_KEY_FORMAT: &str = "%B %Y";
const WEEK_LABEL_DATE_FORMAT: &str = "%Y-%m-%d";

/// One Monday-to-Sunday week overlapping a specific month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWeek {
    monday: NaiveDate,
    year: i32,
    month: u32,
}

impl CalendarWeek {
    /// First day (Monday) of this week.
    pub fn monday(&self) -> NaiveDate {
        self.monday
    }

    /// Last day (Sunday) of this week.
    pub fn sunday(&self) -> NaiveDate {
        self.monday
            .checked_add_days(Days::new(DAYS_PER_WEEK - 1))
            .unwrap_or(NaiveDate::MAX)
    }

    /// All seven dates, Monday first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        self.monday.iter_days().take(DAYS_PER_WEEK as usize)
    }

    /// Dates of this week that belong to the owning month.
    pub fn in_month_dates(&self) -> Vec<NaiveDate> {
        let (year, month) = (self.year, self.month);
        self.dates()
            .filter(|date| date.year() == year && date.month() == month)
            .collect()
    }

    /// Stable anchor label, e.g. `2025-12-29/2026-01-04`.
    pub fn label(&self) -> String {
        week_label(self.monday, self.sunday())
    }

    /// Returns whether `date` is one of this week's seven days.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.monday && date <= self.sunday()
    }
}

/// Returns the weeks overlapping `year`/`month`, in calendar order.
///
/// The first week starts on the Monday on or before the 1st; the last week
/// ends on the Sunday on or after the month's last day. Invalid pairs
/// (month outside 1..=12, unrepresentable years) yield an empty list.
pub fn weeks_covering_month(year: i32, month: u32) -> Vec<CalendarWeek> {
    let Some((first, last)) = month_bounds(year, month) else {
        return Vec::new();
    };

    let offset = u64::from(first.weekday().num_days_from_monday());
    let Some(mut monday) = first.checked_sub_days(Days::new(offset)) else {
        return Vec::new();
    };

    let mut weeks = Vec::with_capacity(6);
    while monday <= last {
        weeks.push(CalendarWeek {
            monday,
            year,
            month,
        });
        match monday.checked_add_days(Days::new(DAYS_PER_WEEK)) {
            Some(next) => monday = next,
            None => break,
        }
    }
    weeks
}

/// Formats the label for a Monday/Sunday span.
pub fn week_label(monday: NaiveDate, sunday: NaiveDate) -> String {
    format!(
        "{}/{}",
        monday.format(WEEK_LABEL_DATE_FORMAT),
        sunday.format(WEEK_LABEL_DATE_FORMAT)
    )
}

/// Returns the first and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = next_period((year, month));
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    Some((first, last))
}

/// Returns whether `(year, month)` names a representable calendar month.
pub fn is_valid_period(year: i32, month: u32) -> bool {
    month_bounds(year, month).is_some()
}

/// Month following `(year, month)`.
pub fn next_period((year, month): (i32, u32)) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Display key for a month, e.g. `January 2026`.
pub fn month_display_key(year: i32, month: u32) -> String {
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first) => first.format(MONTH_KEY_FORMAT).to_string(),
        None => format!("{year:04}-{month:02}"),
    }
}

/// Parses a month key into `(year, month)`.
///
/// Accepts display keys (`January 2026`, `Jan 2026`, case-insensitive) and
/// ISO year-month keys (`2026-01`). Returns `None` for anything else.
pub fn parse_month_key(key: &str) -> Option<(i32, u32)> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_MONTH_KEY_RE.captures(trimmed) {
        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let month = caps.get(2)?.as_str().parse::<u32>().ok()?;
        return is_valid_period(year, month).then_some((year, month));
    }

    let padded = format!("01 {trimmed}");
    NaiveDate::parse_from_str(&padded, "%d %B %Y")
        .ok()
        .map(|date| (date.year(), date.month()))
}

#[cfg(test)]
mod tests {
    use super::{
        month_bounds, month_display_key, next_period, parse_month_key, week_label,
        weeks_covering_month,
    };
    use chrono::{Datelike, NaiveDate, Weekday};
    use std::collections::BTreeSet;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn weeks_partition_every_month_of_several_years() {
        for year in [1999, 2020, 2024, 2025, 2026, 2100] {
            for month in 1..=12 {
                let (first, last) = month_bounds(year, month).unwrap();
                let weeks = weeks_covering_month(year, month);

                let mut seen = BTreeSet::new();
                for week in &weeks {
                    assert_eq!(week.monday().weekday(), Weekday::Mon);
                    assert_eq!(week.sunday().weekday(), Weekday::Sun);
                    assert_eq!(week.dates().count(), 7);
                    for date in week.in_month_dates() {
                        assert!(seen.insert(date), "duplicate date {date}");
                    }
                }

                let expected: BTreeSet<_> = first.iter_days().take_while(|d| *d <= last).collect();
                assert_eq!(seen, expected, "coverage mismatch for {year}-{month}");
                assert!(weeks.first().unwrap().contains(first));
                assert!(weeks.last().unwrap().contains(last));
            }
        }
    }

    #[test]
    fn handles_four_five_and_six_week_months() {
        // February 2021 starts on Monday and ends on Sunday.
        assert_eq!(weeks_covering_month(2021, 2).len(), 4);
        assert_eq!(weeks_covering_month(2026, 1).len(), 5);
        // March 2026 starts on Sunday and has 31 days.
        assert_eq!(weeks_covering_month(2026, 3).len(), 6);
    }

    #[test]
    fn first_week_of_january_2026_spans_year_boundary() {
        let weeks = weeks_covering_month(2026, 1);
        let first = weeks[0];
        assert_eq!(first.monday(), ymd(2025, 12, 29));
        assert_eq!(first.sunday(), ymd(2026, 1, 4));
        assert_eq!(first.label(), "2025-12-29/2026-01-04");
        assert_eq!(
            first.in_month_dates(),
            vec![ymd(2026, 1, 1), ymd(2026, 1, 2), ymd(2026, 1, 3), ymd(2026, 1, 4)]
        );
    }

    #[test]
    fn shared_week_has_same_label_in_both_months() {
        let december = weeks_covering_month(2025, 12);
        let january = weeks_covering_month(2026, 1);
        assert_eq!(december.last().unwrap().label(), january[0].label());
        assert_ne!(
            december.last().unwrap().in_month_dates(),
            january[0].in_month_dates()
        );
    }

    #[test]
    fn invalid_period_yields_no_weeks() {
        assert!(weeks_covering_month(2026, 0).is_empty());
        assert!(weeks_covering_month(2026, 13).is_empty());
    }

    #[test]
    fn month_keys_parse_and_format() {
        assert_eq!(month_display_key(2026, 1), "January 2026");
        assert_eq!(parse_month_key("January 2026"), Some((2026, 1)));
        assert_eq!(parse_month_key("  march 2025 "), Some((2025, 3)));
        assert_eq!(parse_month_key("Sep 2024"), Some((2024, 9)));
        assert_eq!(parse_month_key("2025-04"), Some((2025, 4)));
        assert_eq!(parse_month_key("2025-13"), None);
        assert_eq!(parse_month_key("not a month"), None);
        assert_eq!(parse_month_key(""), None);
    }

    #[test]
    fn next_period_rolls_over_year() {
        assert_eq!(next_period((2025, 12)), (2026, 1));
        assert_eq!(next_period((2025, 3)), (2025, 4));
    }

    #[test]
    fn label_uses_iso_interval() {
        assert_eq!(
            week_label(ymd(2025, 3, 31), ymd(2025, 4, 6)),
            "2025-03-31/2025-04-06"
        );
    }
}
