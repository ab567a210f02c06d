//! Ad-spend fetcher: per-campaign daily cost folded into a date to spend mapping.

mod google_ads;

use std::collections::{BTreeMap, BTreeSet};

use appmetrics_core::{AppConfig, DailySpend, LookbackWindow, SyncError};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::ConnectorError;

pub use google_ads::{ADS_API_VERSION, GoogleAdsSpendSource, parse_ads_date};

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// One campaign's cost on one day, as reported by the ad platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRow {
    pub campaign: String,
    pub date: NaiveDate,
    pub cost_micros: i64,
}

/// Cost report request for one ad account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendQuery {
    pub customer_id: String,
    pub window: LookbackWindow,
    pub campaign_prefix: Option<String>,
}

impl SpendQuery {
    /// Builds the request for `app`: the last `date_range_days` complete days, optionally
    /// narrowed to campaigns whose name starts with the configured prefix.
    pub fn for_app(app: &AppConfig, today: NaiveDate) -> Result<Self, SyncError> {
        let customer_id = app
            .ads()?
            .customer_id()
            .ok_or_else(|| SyncError::configuration(format!("no ad account id for {}", app.name())))?;
        let days = app.spend_lookback_days();
        let window = LookbackWindow::checked_ending_yesterday(today, days).ok_or_else(|| {
            SyncError::configuration(format!("date_range_days {} out of range for {}", days, app.name()))
        })?;
        Ok(Self {
            customer_id,
            window,
            campaign_prefix: app.campaign_prefix().map(str::to_string),
        })
    }

    /// Search query selecting campaign name, date and cost over the window.
    pub fn to_gaql(&self) -> String {
        let mut query = format!(
            "SELECT campaign.name, segments.date, metrics.cost_micros FROM campaign \
             WHERE segments.date BETWEEN '{}' AND '{}'",
            self.window.start.format("%Y-%m-%d"),
            self.window.end.format("%Y-%m-%d"),
        );
        if let Some(prefix) = &self.campaign_prefix {
            query.push_str(&format!(" AND campaign.name LIKE '{}%'", escape_literal(prefix)));
        }
        query
    }

    pub fn matches(&self, campaign: &str) -> bool {
        self.campaign_prefix
            .as_deref()
            .is_none_or(|prefix| campaign.starts_with(prefix))
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Queries the ad platform for per-campaign daily cost.
pub trait SpendSource {
    fn query_spend(&self, query: &SpendQuery) -> Result<Vec<SpendRow>, ConnectorError>;
}

/// Sums cost across the campaigns matching `query`, per date, in currency units.
pub fn aggregate_spend(rows: &[SpendRow], query: &SpendQuery) -> DailySpend {
    let mut micros: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for row in rows.iter().filter(|row| query.matches(&row.campaign)) {
        *micros.entry(row.date).or_default() += row.cost_micros;
    }
    micros
        .into_iter()
        .map(|(date, total)| (date, total as f64 / MICROS_PER_UNIT))
        .collect()
}

/// Daily spend for `app` over its lookback window ending yesterday.
///
/// A missing ad account is a configuration error; the caller continues with zero spend.
/// A failed platform query is not an error here: each reported reason is logged and the
/// mapping comes back empty.
pub fn fetch_daily_spend(
    source: &dyn SpendSource,
    app: &AppConfig,
    today: NaiveDate,
) -> Result<DailySpend, SyncError> {
    let query = SpendQuery::for_app(app, today)?;
    let rows = match source.query_spend(&query) {
        Ok(rows) => rows,
        Err(err) => {
            for reason in err.reasons() {
                warn!(
                    event = "ads.query_failed",
                    domain = "ads",
                    app = app.name(),
                    code = err.code(),
                    reason = %reason
                );
            }
            return Ok(DailySpend::new());
        }
    };

    let campaigns: BTreeSet<&str> = rows
        .iter()
        .filter(|row| query.matches(&row.campaign))
        .map(|row| row.campaign.as_str())
        .collect();
    let spend = aggregate_spend(&rows, &query);
    for (date, amount) in &spend {
        debug!(
            event = "ads.daily_spend",
            domain = "ads",
            app = app.name(),
            date = %date,
            spend = format!("{:.2}", amount)
        );
    }
    info!(
        event = "ads.spend_fetched",
        domain = "ads",
        app = app.name(),
        campaigns = campaigns.len() as u64,
        days = spend.len() as u64
    );
    Ok(spend)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use appmetrics_core::config::AdsConfig;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn row(campaign: &str, d: u32, cost_micros: i64) -> SpendRow {
        SpendRow {
            campaign: campaign.to_string(),
            date: date(d),
            cost_micros,
        }
    }

    fn app(prefix: Option<&str>) -> AppConfig {
        AppConfig {
            app_name: Some("Puzzle".into()),
            gads: Some(AdsConfig {
                customer_id: Some("123-456-7890".into()),
                ..AdsConfig::default()
            }),
            campaign_prefix: prefix.map(str::to_string),
            ..AppConfig::default()
        }
    }

    struct FixedSource {
        result: Result<Vec<SpendRow>, ConnectorError>,
        seen: RefCell<Vec<SpendQuery>>,
    }

    impl SpendSource for FixedSource {
        fn query_spend(&self, query: &SpendQuery) -> Result<Vec<SpendRow>, ConnectorError> {
            self.seen.borrow_mut().push(query.clone());
            self.result.clone()
        }
    }

    fn source(result: Result<Vec<SpendRow>, ConnectorError>) -> FixedSource {
        FixedSource {
            result,
            seen: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn query_covers_lookback_ending_yesterday() {
        let query = SpendQuery::for_app(&app(Some("PZ_")), date(10)).unwrap();
        assert_eq!(query.customer_id, "1234567890");
        assert_eq!(query.window.start, date(8));
        assert_eq!(query.window.end, date(9));
        assert_eq!(
            query.to_gaql(),
            "SELECT campaign.name, segments.date, metrics.cost_micros FROM campaign \
             WHERE segments.date BETWEEN '2024-06-08' AND '2024-06-09' \
             AND campaign.name LIKE 'PZ_%'"
        );
    }

    #[test]
    fn prefix_literal_is_escaped() {
        let mut query = SpendQuery::for_app(&app(None), date(10)).unwrap();
        assert!(!query.to_gaql().contains("LIKE"));
        query.campaign_prefix = Some("O'Brien".into());
        assert!(query.to_gaql().ends_with("LIKE 'O\\'Brien%'"));
    }

    #[test]
    fn sums_micros_across_matching_campaigns() {
        let query = SpendQuery::for_app(&app(Some("PZ")), date(10)).unwrap();
        let rows = vec![
            row("PZ_us", 8, 12_500_000),
            row("PZ_eu", 8, 7_500_000),
            row("Other", 8, 99_000_000),
            row("PZ_us", 9, 1_230_000),
        ];
        let spend = aggregate_spend(&rows, &query);
        assert_eq!(spend.get(&date(8)), Some(&20.0));
        assert_eq!(spend.get(&date(9)), Some(&1.23));
        assert_eq!(spend.len(), 2);
    }

    #[test]
    fn missing_account_is_a_configuration_error() {
        let mut cfg = app(None);
        cfg.gads = Some(AdsConfig::default());
        let src = source(Ok(vec![]));
        let err = fetch_daily_spend(&src, &cfg, date(10)).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(src.seen.borrow().is_empty());
    }

    #[test]
    fn oversized_lookback_is_a_configuration_error() {
        let mut cfg = app(None);
        cfg.date_range_days = Some(100_000_000);
        let err = SpendQuery::for_app(&cfg, date(10)).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        let src = source(Ok(vec![]));
        assert!(fetch_daily_spend(&src, &cfg, date(10)).is_err());
        assert!(src.seen.borrow().is_empty());
    }

    #[test]
    fn query_failure_yields_empty_spend() {
        let src = source(Err(ConnectorError::Rejected {
            provider: "google_ads",
            reasons: vec!["customer not enabled".into()],
        }));
        let spend = fetch_daily_spend(&src, &app(None), date(10)).unwrap();
        assert!(spend.is_empty());
        assert_eq!(src.seen.borrow().len(), 1);
    }

    #[test]
    fn fetch_returns_aggregated_spend() {
        let src = source(Ok(vec![row("A", 9, 50_000_000), row("B", 9, 25_000_000)]));
        let spend = fetch_daily_spend(&src, &app(None), date(10)).unwrap();
        assert_eq!(spend.get(&date(9)), Some(&75.0));
    }
}
