use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;

use super::{SpendQuery, SpendRow, SpendSource};
use crate::auth::AccessTokenProvider;
use crate::error::ConnectorError;
use crate::http::{HttpRequest, JsonHttp};

pub const ADS_API_VERSION: &str = "v18";
const ADS_BASE_URL: &str = "https://googleads.googleapis.com";
const PROVIDER: &str = "google_ads";

/// Google Ads REST search, paged through `nextPageToken`.
pub struct GoogleAdsSpendSource {
    http: JsonHttp,
    tokens: Arc<dyn AccessTokenProvider>,
    developer_token: String,
    login_customer_id: Option<String>,
    base_url: String,
}

impl GoogleAdsSpendSource {
    pub fn new(
        http: JsonHttp,
        tokens: Arc<dyn AccessTokenProvider>,
        developer_token: impl Into<String>,
        login_customer_id: Option<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            developer_token: developer_token.into(),
            login_customer_id,
            base_url: ADS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_url(&self, customer_id: &str) -> String {
        format!(
            "{}/{}/customers/{}/googleAds:search",
            self.base_url.trim_end_matches('/'),
            ADS_API_VERSION,
            customer_id
        )
    }

    fn search_page(
        &self,
        url: &str,
        gaql: &str,
        page_token: Option<&str>,
    ) -> Result<SearchResponse, ConnectorError> {
        let mut body = serde_json::json!({ "query": gaql });
        if let Some(token) = page_token {
            body["pageToken"] = serde_json::Value::String(token.to_string());
        }
        let mut request = HttpRequest::post(url)
            .bearer(self.tokens.access_token()?)
            .header("developer-token", &self.developer_token)
            .json(body);
        if let Some(login) = &self.login_customer_id {
            request = request.header("login-customer-id", login);
        }
        self.http.execute_json(&request).map_err(into_failure)
    }
}

impl SpendSource for GoogleAdsSpendSource {
    fn query_spend(&self, query: &SpendQuery) -> Result<Vec<SpendRow>, ConnectorError> {
        let url = self.search_url(&query.customer_id);
        let gaql = query.to_gaql();
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.search_page(&url, &gaql, page_token.as_deref())?;
            for result in page.results {
                rows.push(result.into_row()?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(rows)
    }
}

/// Accepts `YYYY-MM-DD` and `YYYYMMDD`.
pub fn parse_ads_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    #[serde(default)]
    campaign: Option<Campaign>,
    segments: Segments,
    #[serde(default)]
    metrics: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
struct Campaign {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Segments {
    date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    #[serde(default)]
    cost_micros: Option<serde_json::Value>,
}

impl SearchRow {
    fn into_row(self) -> Result<SpendRow, ConnectorError> {
        let date = parse_ads_date(&self.segments.date).ok_or_else(|| {
            ConnectorError::protocol(PROVIDER, format!("unrecognised date {:?}", self.segments.date))
        })?;
        let cost_micros = match self.metrics.and_then(|m| m.cost_micros) {
            None | Some(serde_json::Value::Null) => 0,
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.trim().parse().map_err(|_| {
                ConnectorError::protocol(PROVIDER, format!("unrecognised cost {:?}", s))
            })?,
            Some(other) => {
                return Err(ConnectorError::protocol(
                    PROVIDER,
                    format!("unrecognised cost {}", other),
                ));
            }
        };
        Ok(SpendRow {
            campaign: self.campaign.map(|c| c.name).unwrap_or_default(),
            date,
            cost_micros,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FailureEnvelope {
    error: FailureStatus,
}

#[derive(Debug, Deserialize)]
struct FailureStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<FailureDetail>,
}

#[derive(Debug, Deserialize)]
struct FailureDetail {
    #[serde(default)]
    errors: Vec<AdsError>,
}

#[derive(Debug, Deserialize)]
struct AdsError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    location: Option<AdsErrorLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdsErrorLocation {
    #[serde(default)]
    field_path_elements: Vec<FieldPathElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldPathElement {
    field_name: String,
}

/// Turns an error status carrying a Google Ads failure into one reason per reported error.
fn into_failure(err: ConnectorError) -> ConnectorError {
    let ConnectorError::Http { status, body, .. } = &err else {
        return err;
    };
    let Ok(envelope) = serde_json::from_str::<FailureEnvelope>(body) else {
        return err;
    };
    let mut reasons: Vec<String> = envelope
        .error
        .details
        .iter()
        .flat_map(|detail| detail.errors.iter())
        .map(|error| {
            let fields: Vec<&str> = error
                .location
                .iter()
                .flat_map(|loc| loc.field_path_elements.iter())
                .map(|el| el.field_name.as_str())
                .collect();
            if fields.is_empty() {
                error.message.clone()
            } else {
                format!("{} (on field: {})", error.message, fields.join("."))
            }
        })
        .collect();
    if reasons.is_empty() {
        if envelope.error.message.is_empty() {
            return err;
        }
        reasons.push(format!("status {}: {}", status, envelope.error.message));
    }
    ConnectorError::Rejected {
        provider: PROVIDER,
        reasons,
    }
}
