//! Revenue/engagement fetcher: the analytics reports for the trailing window, reconciled with
//! known spend and narrowed to the reporting window.

mod ga4;

use std::collections::BTreeMap;

use appmetrics_core::reconcile::{self, LookbackWindow};
use appmetrics_core::{DailyMetricRecord, DailySpend, RenewalDay, RevenueDay};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::ConnectorError;

pub use ga4::{Ga4RevenueSource, ReportRequest, ReportRow};

/// Per-date reports from the analytics platform for one property.
pub trait RevenueSource {
    /// Total revenue, purchase revenue and transaction count per date.
    fn revenue_by_date(
        &self,
        property_id: &str,
        window: &LookbackWindow,
    ) -> Result<BTreeMap<NaiveDate, RevenueDay>, ConnectorError>;

    /// Purchase-event count and distinct purchasing users per date.
    fn renewals_by_date(
        &self,
        property_id: &str,
        window: &LookbackWindow,
    ) -> Result<BTreeMap<NaiveDate, RenewalDay>, ConnectorError>;
}

/// Derived records for the reporting window (the last two complete days).
///
/// Both reports cover `[today - 16, yesterday]` so trailing averages see the full history.
/// Any query failure degrades to [`reconcile::degraded_window`]: zero-revenue rows for the
/// reporting window carrying known spend, or nothing when no spend is known. Never fails.
pub fn fetch_revenue_window(
    source: &dyn RevenueSource,
    property_id: &str,
    spend: &DailySpend,
    today: NaiveDate,
) -> Vec<DailyMetricRecord> {
    let lookback = LookbackWindow::revenue(today);
    let reports = source
        .revenue_by_date(property_id, &lookback)
        .and_then(|revenue| Ok((revenue, source.renewals_by_date(property_id, &lookback)?)));

    let (revenue, renewals) = match reports {
        Ok(reports) => reports,
        Err(err) => {
            let degraded = reconcile::degraded_window(today, spend);
            warn!(
                event = "analytics.query_failed",
                domain = "analytics",
                property_id = property_id,
                code = err.code(),
                error = %err,
                placeholder_rows = degraded.len() as u64
            );
            return degraded;
        }
    };

    let records = reconcile::reconcile(&revenue, &renewals, spend, &lookback);
    let reporting = LookbackWindow::reporting(today);
    let selected = reconcile::select_reporting_window(records, &reporting, spend);
    info!(
        event = "analytics.window_derived",
        domain = "analytics",
        property_id = property_id,
        revenue_days = revenue.len() as u64,
        renewal_days = renewals.len() as u64,
        emitted = selected.len() as u64
    );
    selected
}
