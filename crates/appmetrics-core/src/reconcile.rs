//! Reconciles the spend and revenue sources on one date axis and narrows the derived
//! sequence to the reporting window.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};

use crate::derive::derive_trailing_metrics;
use crate::model::{DailyMetricRecord, DailySpend, RenewalDay, RevenueDay};

/// Days of revenue history queried ending yesterday; enough to fill the widest trailing window.
pub const REVENUE_LOOKBACK_DAYS: i64 = 16;
/// Complete days emitted per run, ending yesterday.
pub const REPORTING_WINDOW_DAYS: i64 = 2;
/// Spend lookback when an app does not override it.
pub const DEFAULT_SPEND_LOOKBACK_DAYS: i64 = 2;

/// Inclusive date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LookbackWindow {
    /// `[today - days, today - 1]`. A non-positive `days` collapses to yesterday alone.
    pub fn ending_yesterday(today: NaiveDate, days: i64) -> Self {
        let end = today - Duration::days(1);
        let start = today - Duration::days(days.max(1));
        Self { start, end }
    }

    /// Like [`LookbackWindow::ending_yesterday`], but `None` when `today - days` falls outside
    /// the representable calendar.
    pub fn checked_ending_yesterday(today: NaiveDate, days: i64) -> Option<Self> {
        let end = today.checked_sub_signed(Duration::try_days(1)?)?;
        let start = today.checked_sub_signed(Duration::try_days(days.max(1))?)?;
        Some(Self { start, end })
    }

    pub fn revenue(today: NaiveDate) -> Self {
        Self::ending_yesterday(today, REVENUE_LOOKBACK_DAYS)
    }

    pub fn reporting(today: NaiveDate) -> Self {
        Self::ending_yesterday(today, REPORTING_WINDOW_DAYS)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(|d| *d <= self.end)
    }
}

/// Builds one record per date seen by either source, defaulting absent metrics to zero, and
/// runs the derivation engine over the whole sorted sequence.
///
/// Dates only known to the renewal report do not widen the axis. When neither revenue nor
/// spend reported any date, every date of `lookback` is represented.
pub fn reconcile(
    revenue: &BTreeMap<NaiveDate, RevenueDay>,
    renewals: &BTreeMap<NaiveDate, RenewalDay>,
    spend: &DailySpend,
    lookback: &LookbackWindow,
) -> Vec<DailyMetricRecord> {
    let mut dates: BTreeSet<NaiveDate> = revenue.keys().chain(spend.keys()).copied().collect();
    if dates.is_empty() {
        dates.extend(lookback.dates());
    }

    let mut records: Vec<DailyMetricRecord> = dates
        .into_iter()
        .map(|date| {
            DailyMetricRecord::assemble(
                date,
                spend.get(&date).copied().unwrap_or(0.0),
                revenue.get(&date).copied().unwrap_or_default(),
                renewals.get(&date).copied().unwrap_or_default(),
            )
        })
        .collect();
    derive_trailing_metrics(&mut records);
    records
}

/// Keeps the records inside `window`; when none are, emits placeholders for exactly the
/// window's dates carrying whatever spend is known.
pub fn select_reporting_window(
    records: Vec<DailyMetricRecord>,
    window: &LookbackWindow,
    spend: &DailySpend,
) -> Vec<DailyMetricRecord> {
    let selected: Vec<DailyMetricRecord> =
        records.into_iter().filter(|r| window.contains(r.date)).collect();
    if selected.is_empty() {
        return placeholder_window(window, spend);
    }
    selected
}

/// Zero-revenue records for every date of `window`, keeping known spend.
pub fn placeholder_window(window: &LookbackWindow, spend: &DailySpend) -> Vec<DailyMetricRecord> {
    window
        .dates()
        .map(|date| DailyMetricRecord::placeholder(date, spend.get(&date).copied().unwrap_or(0.0)))
        .collect()
}

/// Output when the revenue side failed entirely: placeholders for the reporting window if any
/// spend is known, otherwise nothing.
pub fn degraded_window(today: NaiveDate, spend: &DailySpend) -> Vec<DailyMetricRecord> {
    if spend.is_empty() {
        return Vec::new();
    }
    placeholder_window(&LookbackWindow::reporting(today), spend)
}
