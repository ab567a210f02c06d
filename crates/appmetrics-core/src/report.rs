//! Monthly grouping and display rendering of derived records.

use std::collections::BTreeMap;

use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{DailyMetricRecord, round_to};

/// Column names written after the month name in a month header row.
pub const COLUMN_HEADERS: [&str; 19] = [
    "Gads_Spend",
    "Total_spend",
    "Total New Revenue",
    "Ad Revenue",
    "IAP_Revenue",
    "Count of Purchases",
    "Renewal",
    "Renewal_Count",
    "Total Revenue",
    "ROAS",
    "ROI",
    "L3_ROAS",
    "L7_ROAS",
    "L14_ROAS",
    "L3_ROI",
    "L7_ROI",
    "L14_ROI",
    "ROAS_Indicator",
    "ROI_Indicator",
];

/// Cells per written row: the date (or month name) column plus [`COLUMN_HEADERS`].
pub const ROW_WIDTH: usize = COLUMN_HEADERS.len() + 1;

/// Rendered in place of a value that was not computed or is not a number.
pub const NOT_AVAILABLE: &str = "N/A";

/// A single written cell. Counts stay integers; everything else is display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(u64),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn blank() -> Self {
        Self::Text(String::new())
    }

    /// The cell as the sheet would show it when read back.
    pub fn display(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

pub type SheetRow = Vec<CellValue>;

/// Calendar month of a record, ordered by year then month index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// English month name as used in sheet header rows, e.g. `June`.
    pub fn name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }
}

/// Records of one run grouped by month; months iterate in calendar order and each bucket is
/// sorted by date with one record per date.
pub type MonthlyBuckets = BTreeMap<MonthKey, Vec<DailyMetricRecord>>;

pub fn group_by_month(records: impl IntoIterator<Item = DailyMetricRecord>) -> MonthlyBuckets {
    let mut buckets = MonthlyBuckets::new();
    for record in records {
        buckets.entry(MonthKey::of(record.date)).or_default().push(record);
    }
    for rows in buckets.values_mut() {
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
    }
    buckets
}

/// `$` followed by two decimals.
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    format!("${:.2}", value)
}

/// Up to two decimals; whole numbers keep one (`2.0`).
fn format_decimal(value: f64) -> String {
    let value = round_to(value, 2);
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Per-day ratio. Missing and zero both display as `0`.
pub fn format_ratio(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() && v != 0.0 => format_decimal(v),
        _ => "0".to_string(),
    }
}

/// Trailing average; a computed zero shows `0`, an uncomputed one shows `N/A`.
pub fn format_average(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_finite() => NOT_AVAILABLE.to_string(),
        Some(v) if v == 0.0 => "0".to_string(),
        Some(v) => format_decimal(v),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Signed percentage with one decimal: `0%`, `+12.5%`, `-3.0%`.
///
/// Only an exact zero renders `0%`. A non-zero change that rounds to zero keeps its sign:
/// `+0.0%` or `-0.0%`.
pub fn format_indicator(change: Option<f64>) -> String {
    match change {
        Some(v) if !v.is_finite() => NOT_AVAILABLE.to_string(),
        Some(v) if v == 0.0 => "0%".to_string(),
        Some(v) if v > 0.0 => format!("+{:.1}%", v),
        Some(v) => format!("{:.1}%", v),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn render_row(record: &DailyMetricRecord, date_cell: String) -> SheetRow {
    let t = &record.trailing;
    vec![
        CellValue::Text(date_cell),
        CellValue::Text(format_currency(record.ad_spend)),
        CellValue::Text(format_currency(record.ad_spend)),
        CellValue::Text(format_currency(record.gross_revenue)),
        CellValue::Text(format_currency(record.ad_revenue)),
        CellValue::Text(format_currency(record.iap_revenue)),
        CellValue::Integer(record.purchase_count),
        CellValue::Integer(record.renewal),
        CellValue::Integer(record.renewal_count),
        CellValue::Text(format_currency(record.gross_revenue)),
        CellValue::Text(format_ratio(record.roas)),
        CellValue::Text(format_ratio(record.roi)),
        CellValue::Text(format_average(t.l3_roas)),
        CellValue::Text(format_average(t.l7_roas)),
        CellValue::Text(format_average(t.l14_roas)),
        CellValue::Text(format_average(t.l3_roi)),
        CellValue::Text(format_average(t.l7_roi)),
        CellValue::Text(format_average(t.l14_roi)),
        CellValue::Text(format_indicator(t.roas_indicator)),
        CellValue::Text(format_indicator(t.roi_indicator)),
    ]
}

pub fn header_row(month: MonthKey) -> SheetRow {
    std::iter::once(month.name())
        .chain(COLUMN_HEADERS)
        .map(CellValue::text)
        .collect()
}

pub fn blank_row() -> SheetRow {
    vec![CellValue::blank(); ROW_WIDTH]
}
