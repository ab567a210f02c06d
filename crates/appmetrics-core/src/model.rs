use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Aggregated ad spend per calendar date, in currency units.
pub type DailySpend = BTreeMap<NaiveDate, f64>;

/// Revenue-side measurements for one date as reported by the analytics platform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RevenueDay {
    pub total_revenue: f64,
    /// In-app-purchase revenue; the remainder of `total_revenue` is ad revenue.
    pub iap_revenue: f64,
    pub purchase_count: u64,
}

/// Purchase-event engagement signal for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenewalDay {
    /// Distinct users that fired a purchase event.
    pub renewal: u64,
    /// Number of purchase events.
    pub renewal_count: u64,
}

/// Trailing averages and day-over-day indicators attached to a record.
///
/// `None` means "not computed" (insufficient history, or no defined datapoint). A computed
/// zero is `Some(0.0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrailingWindowMetrics {
    pub l3_roas: Option<f64>,
    pub l7_roas: Option<f64>,
    pub l14_roas: Option<f64>,
    pub l3_roi: Option<f64>,
    pub l7_roi: Option<f64>,
    pub l14_roi: Option<f64>,
    /// Percentage change of ROAS against the preceding date.
    pub roas_indicator: Option<f64>,
    /// Percentage change of ROI against the preceding date.
    pub roi_indicator: Option<f64>,
}

impl TrailingWindowMetrics {
    /// Averages pinned to zero and indicators left undefined, as carried by placeholder rows.
    pub fn zeroed() -> Self {
        Self {
            l3_roas: Some(0.0),
            l7_roas: Some(0.0),
            l14_roas: Some(0.0),
            l3_roi: Some(0.0),
            l7_roi: Some(0.0),
            l14_roi: Some(0.0),
            roas_indicator: None,
            roi_indicator: None,
        }
    }
}

/// One calendar date for one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricRecord {
    pub date: NaiveDate,
    pub ad_spend: f64,
    pub gross_revenue: f64,
    pub iap_revenue: f64,
    pub purchase_count: u64,
    pub renewal: u64,
    pub renewal_count: u64,
    pub ad_revenue: f64,
    /// `gross_revenue / ad_spend`, undefined when spend is not positive.
    pub roas: Option<f64>,
    /// `(gross_revenue - ad_spend) / ad_spend`, undefined when spend is not positive.
    pub roi: Option<f64>,
    pub trailing: TrailingWindowMetrics,
}

impl DailyMetricRecord {
    /// Builds a record from whatever each source knows about `date`, computing the
    /// per-day ratios. Trailing metrics are left for the derivation pass.
    pub fn assemble(date: NaiveDate, ad_spend: f64, revenue: RevenueDay, renewal: RenewalDay) -> Self {
        let ad_spend = if ad_spend.is_finite() { ad_spend.max(0.0) } else { 0.0 };
        let (roas, roi) = if ad_spend > 0.0 {
            (
                Some(round_to(revenue.total_revenue / ad_spend, 2)),
                Some(round_to((revenue.total_revenue - ad_spend) / ad_spend, 2)),
            )
        } else {
            (None, None)
        };
        Self {
            date,
            ad_spend,
            gross_revenue: revenue.total_revenue,
            iap_revenue: revenue.iap_revenue,
            purchase_count: revenue.purchase_count,
            renewal: renewal.renewal,
            renewal_count: renewal.renewal_count,
            ad_revenue: revenue.total_revenue - revenue.iap_revenue,
            roas,
            roi,
            trailing: TrailingWindowMetrics::default(),
        }
    }

    /// Zero-revenue stand-in for a date the analytics side could not report, keeping any
    /// known spend.
    pub fn placeholder(date: NaiveDate, ad_spend: f64) -> Self {
        let mut record = Self::assemble(date, ad_spend, RevenueDay::default(), RenewalDay::default());
        record.trailing = TrailingWindowMetrics::zeroed();
        record
    }
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
