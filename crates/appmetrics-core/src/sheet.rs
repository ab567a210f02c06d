//! Column-1 state of a destination sheet and append-only merge planning.
//!
//! The first column mixes date cells in two historical formats, month header cells and
//! blank separators. [`classify_cell`] is the single place that tells them apart.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::report::{MonthlyBuckets, SheetRow, blank_row, header_row, render_row};

/// Fully blank rows appended after each month's data block.
pub const SEPARATOR_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetCell {
    Date(NaiveDate),
    MonthHeader(String),
    Blank,
    /// Contains a date separator but is not a valid date.
    Unrecognized(String),
}

/// Parses `DD-MM-YYYY` (day and month may be unpadded) or `YYYY-MM-DD`.
pub fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    if [a, b, c].iter().any(|p| p.is_empty() || !p.chars().all(|ch| ch.is_ascii_digit())) {
        return None;
    }
    let (year, month, day) = if a.len() == 4 {
        (a.parse().ok()?, b.parse().ok()?, c.parse().ok()?)
    } else if c.len() == 4 {
        (c.parse().ok()?, b.parse().ok()?, a.parse().ok()?)
    } else {
        return None;
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Canonical written form of a date cell.
pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

pub fn classify_cell(raw: &str) -> SheetCell {
    let cell = raw.trim();
    if cell.is_empty() {
        return SheetCell::Blank;
    }
    if cell.contains('-') {
        return match parse_sheet_date(cell) {
            Some(date) => SheetCell::Date(date),
            None => SheetCell::Unrecognized(cell.to_string()),
        };
    }
    SheetCell::MonthHeader(cell.to_string())
}

/// What the destination already holds, read once per app per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetState {
    dates: BTreeSet<NaiveDate>,
    month_headers: BTreeSet<String>,
    blank_rows: usize,
    unrecognized: usize,
}

impl SheetState {
    pub fn from_column<S: AsRef<str>>(cells: &[S]) -> Self {
        let mut state = Self::default();
        for cell in cells {
            match classify_cell(cell.as_ref()) {
                SheetCell::Date(date) => {
                    state.dates.insert(date);
                }
                SheetCell::MonthHeader(name) => {
                    state.month_headers.insert(name);
                }
                SheetCell::Blank => state.blank_rows += 1,
                SheetCell::Unrecognized(_) => state.unrecognized += 1,
            }
        }
        state
    }

    pub fn has_date(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn has_month_header(&self, name: &str) -> bool {
        self.month_headers.contains(name)
    }

    pub fn recorded_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates.iter().copied()
    }

    pub fn blank_rows(&self) -> usize {
        self.blank_rows
    }

    pub fn unrecognized_cells(&self) -> usize {
        self.unrecognized
    }
}

/// Rows to append, in order, plus counts for logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendPlan {
    pub rows: Vec<SheetRow>,
    pub data_rows: usize,
    pub new_months: Vec<String>,
    pub skipped_dates: usize,
}

impl AppendPlan {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Plans the rows that bring `state` up to date with `buckets` without touching what is
/// already there.
///
/// Months are visited in calendar order. A month whose dates are all recorded is skipped
/// entirely; a month with new dates gets a header row only if its name is not yet present,
/// then its new rows in date order, then [`SEPARATOR_ROWS`] blank rows.
pub fn plan_append(state: &SheetState, buckets: &MonthlyBuckets) -> AppendPlan {
    let mut plan = AppendPlan::default();
    let mut headers_written: BTreeSet<&str> = BTreeSet::new();

    for (month, records) in buckets {
        let fresh: Vec<_> = records.iter().filter(|r| !state.has_date(r.date)).collect();
        plan.skipped_dates += records.len() - fresh.len();
        if fresh.is_empty() {
            continue;
        }

        let name = month.name();
        if !state.has_month_header(name) && headers_written.insert(name) {
            plan.rows.push(header_row(*month));
            plan.new_months.push(name.to_string());
        }
        for record in fresh {
            plan.rows.push(render_row(record, format_sheet_date(record.date)));
            plan.data_rows += 1;
        }
        plan.rows.extend(std::iter::repeat_with(blank_row).take(SEPARATOR_ROWS));
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DailyMetricRecord, RenewalDay, RevenueDay};
    use crate::report::{ROW_WIDTH, group_by_month};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn record(d: NaiveDate) -> DailyMetricRecord {
        DailyMetricRecord::assemble(d, 10.0, RevenueDay::default(), RenewalDay::default())
    }

    fn first_cells(plan: &AppendPlan) -> Vec<String> {
        plan.rows.iter().map(|r| r[0].display()).collect()
    }

    #[test]
    fn classifies_both_date_formats_to_one_date() {
        assert_eq!(classify_cell("01-06-2024"), SheetCell::Date(date(6, 1)));
        assert_eq!(classify_cell("1-6-2024"), SheetCell::Date(date(6, 1)));
        assert_eq!(classify_cell(" 2024-06-01 "), SheetCell::Date(date(6, 1)));
        assert_eq!(classify_cell("June"), SheetCell::MonthHeader("June".into()));
        assert_eq!(classify_cell("   "), SheetCell::Blank);
        assert_eq!(classify_cell("31-02-2024"), SheetCell::Unrecognized("31-02-2024".into()));
        assert_eq!(classify_cell("n-a"), SheetCell::Unrecognized("n-a".into()));
    }

    #[test]
    fn written_dates_parse_back() {
        let d = date(11, 9);
        assert_eq!(format_sheet_date(d), "09-11-2024");
        assert_eq!(parse_sheet_date(&format_sheet_date(d)), Some(d));
    }

    #[test]
    fn state_partitions_column() {
        let state = SheetState::from_column(&["June", "01-06-2024", "2024-06-02", "", "", "bad-cell"]);
        assert!(state.has_month_header("June"));
        assert!(state.has_date(date(6, 1)));
        assert!(state.has_date(date(6, 2)));
        assert_eq!(state.blank_rows(), 2);
        assert_eq!(state.unrecognized_cells(), 1);
        assert_eq!(state.recorded_dates().count(), 2);
    }

    #[test]
    fn appends_only_unseen_dates_under_existing_header() {
        let state = SheetState::from_column(&["June", "01-06-2024"]);
        let buckets = group_by_month(vec![record(date(6, 1)), record(date(6, 2))]);
        let plan = plan_append(&state, &buckets);

        assert_eq!(first_cells(&plan), vec!["02-06-2024", "", "", ""]);
        assert_eq!(plan.data_rows, 1);
        assert_eq!(plan.skipped_dates, 1);
        assert!(plan.new_months.is_empty());
        assert!(plan.rows.iter().all(|r| r.len() == ROW_WIDTH));
    }

    #[test]
    fn new_month_gets_header_and_separators() {
        let state = SheetState::from_column(&["May", "31-05-2024"]);
        let buckets = group_by_month(vec![record(date(5, 31)), record(date(6, 1))]);
        let plan = plan_append(&state, &buckets);

        assert_eq!(first_cells(&plan), vec!["June", "01-06-2024", "", "", ""]);
        assert_eq!(plan.new_months, vec!["June".to_string()]);
    }

    #[test]
    fn fully_recorded_month_is_skipped() {
        let state = SheetState::from_column(&["1-6-2024", "2-6-2024"]);
        let buckets = group_by_month(vec![record(date(6, 1)), record(date(6, 2))]);
        assert!(plan_append(&state, &buckets).is_empty());
    }
}
