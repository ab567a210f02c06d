use std::collections::BTreeMap;
use std::sync::Arc;

use appmetrics_core::reconcile::LookbackWindow;
use appmetrics_core::{RenewalDay, RevenueDay};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::RevenueSource;
use crate::auth::AccessTokenProvider;
use crate::error::ConnectorError;
use crate::http::{HttpRequest, JsonHttp};

const DATA_API_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta";
const PROVIDER: &str = "ga4";
const PURCHASE_EVENT: &str = "purchase";

/// Body of a `properties/{id}:runReport` call with a single `date` dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    date_ranges: Vec<serde_json::Value>,
    dimensions: Vec<serde_json::Value>,
    metrics: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_filter: Option<serde_json::Value>,
}

impl ReportRequest {
    pub fn daily(window: &LookbackWindow, metrics: &[&str]) -> Self {
        Self {
            date_ranges: vec![json!({
                "startDate": window.start.format("%Y-%m-%d").to_string(),
                "endDate": window.end.format("%Y-%m-%d").to_string(),
            })],
            dimensions: vec![json!({ "name": "date" })],
            metrics: metrics.iter().map(|name| json!({ "name": name })).collect(),
            dimension_filter: None,
        }
    }

    pub fn only_event(mut self, event_name: &str) -> Self {
        self.dimension_filter = Some(json!({
            "filter": {
                "fieldName": "eventName",
                "stringFilter": { "value": event_name }
            }
        }));
        self
    }
}

/// One report row: the date and its metric values in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

impl ReportRow {
    fn value(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    fn count(&self, index: usize) -> u64 {
        let value = self.value(index);
        if value.is_finite() && value > 0.0 {
            value.round() as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default)]
    rows: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRow {
    #[serde(default)]
    dimension_values: Vec<RawValue>,
    #[serde(default)]
    metric_values: Vec<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    value: Option<String>,
}

impl RawRow {
    fn parse(self) -> Result<ReportRow, ConnectorError> {
        let raw_date = self
            .dimension_values
            .first()
            .and_then(|v| v.value.as_deref())
            .unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|_| {
            ConnectorError::protocol(PROVIDER, format!("unrecognised report date {:?}", raw_date))
        })?;
        let values = self
            .metric_values
            .iter()
            .map(|v| match v.value.as_deref().map(str::trim) {
                None | Some("") => Ok(0.0),
                Some(raw) => raw.parse::<f64>().map_err(|_| {
                    ConnectorError::protocol(PROVIDER, format!("unrecognised metric value {:?}", raw))
                }),
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(ReportRow { date, values })
    }
}

/// Analytics Data API client for one property.
pub struct Ga4RevenueSource {
    http: JsonHttp,
    tokens: Arc<dyn AccessTokenProvider>,
    base_url: String,
}

impl Ga4RevenueSource {
    pub fn new(http: JsonHttp, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http,
            tokens,
            base_url: DATA_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn run_report(
        &self,
        property_id: &str,
        report: &ReportRequest,
    ) -> Result<Vec<ReportRow>, ConnectorError> {
        let url = format!(
            "{}/properties/{}:runReport",
            self.base_url.trim_end_matches('/'),
            property_id
        );
        let body = serde_json::to_value(report)
            .map_err(|e| ConnectorError::protocol(PROVIDER, e.to_string()))?;
        let request = HttpRequest::post(url)
            .bearer(self.tokens.access_token()?)
            .json(body);
        let response: RunReportResponse = self.http.execute_json(&request)?;
        response.rows.into_iter().map(RawRow::parse).collect()
    }
}

impl RevenueSource for Ga4RevenueSource {
    fn revenue_by_date(
        &self,
        property_id: &str,
        window: &LookbackWindow,
    ) -> Result<BTreeMap<NaiveDate, RevenueDay>, ConnectorError> {
        let report = ReportRequest::daily(window, &["totalRevenue", "purchaseRevenue", "transactions"]);
        Ok(self
            .run_report(property_id, &report)?
            .into_iter()
            .map(|row| {
                let day = RevenueDay {
                    total_revenue: row.value(0),
                    iap_revenue: row.value(1),
                    purchase_count: row.count(2),
                };
                (row.date, day)
            })
            .collect())
    }

    fn renewals_by_date(
        &self,
        property_id: &str,
        window: &LookbackWindow,
    ) -> Result<BTreeMap<NaiveDate, RenewalDay>, ConnectorError> {
        let report = ReportRequest::daily(window, &["eventCount", "totalUsers"]).only_event(PURCHASE_EVENT);
        Ok(self
            .run_report(property_id, &report)?
            .into_iter()
            .map(|row| {
                let day = RenewalDay {
                    renewal: row.count(1),
                    renewal_count: row.count(0),
                };
                (row.date, day)
            })
            .collect())
    }
}
