use std::sync::Arc;

use appmetrics_core::{SheetRow, SheetTarget};
use reqwest::Url;
use serde::Deserialize;

use super::{SheetHandle, SheetStore};
use crate::auth::AccessTokenProvider;
use crate::error::ConnectorError;
use crate::http::{HttpRequest, JsonHttp};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
const PROVIDER: &str = "sheets";

/// Column letters for a 1-based index: 1 is `A`, 27 is `AA`.
pub fn column_letter(column: usize) -> String {
    let mut n = column.max(1);
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|b| *b as char).collect()
}

/// `'<tab>'!<cells>` with quotes in the tab name doubled.
pub fn a1_range(tab: &str, cells: &str) -> String {
    format!("'{}'!{}", tab.replace('\'', "''"), cells)
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Tab>,
}

#[derive(Debug, Deserialize)]
struct Tab {
    properties: TabProperties,
}

#[derive(Debug, Deserialize)]
struct TabProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Sheets REST v4 client.
pub struct GoogleSheetsStore {
    http: JsonHttp,
    tokens: Arc<dyn AccessTokenProvider>,
    base_url: String,
}

impl GoogleSheetsStore {
    pub fn new(http: JsonHttp, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http,
            tokens,
            base_url: SHEETS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<String, ConnectorError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ConnectorError::protocol(PROVIDER, format!("invalid base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ConnectorError::protocol(PROVIDER, "base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.to_string())
    }

    fn authorized(&self, request: HttpRequest) -> Result<HttpRequest, ConnectorError> {
        Ok(request.bearer(self.tokens.access_token()?))
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetStore for GoogleSheetsStore {
    fn open(&self, target: &SheetTarget) -> Result<SheetHandle, ConnectorError> {
        let url = self.url(
            &["spreadsheets", target.sheet_id.as_str()],
            &[("fields", "sheets.properties.title")],
        )?;
        let spreadsheet: Spreadsheet = self.http.execute_json(&self.authorized(HttpRequest::get(url))?)?;
        if !spreadsheet.sheets.iter().any(|t| t.properties.title == target.tab) {
            return Err(ConnectorError::not_found(
                PROVIDER,
                format!("tab {:?} not found in spreadsheet {}", target.tab, target.sheet_id),
            ));
        }
        Ok(SheetHandle {
            sheet_id: target.sheet_id.clone(),
            tab: target.tab.clone(),
        })
    }

    fn read_column(&self, handle: &SheetHandle, column: usize) -> Result<Vec<String>, ConnectorError> {
        let letter = column_letter(column);
        let range = a1_range(&handle.tab, &format!("{}:{}", letter, letter));
        let url = self.url(
            &["spreadsheets", handle.sheet_id.as_str(), "values", range.as_str()],
            &[("majorDimension", "COLUMNS")],
        )?;
        let values: ValueRange = self.http.execute_json(&self.authorized(HttpRequest::get(url))?)?;
        Ok(values
            .values
            .into_iter()
            .next()
            .map(|cells| cells.iter().map(cell_text).collect())
            .unwrap_or_default())
    }

    fn append_rows(&self, handle: &SheetHandle, rows: &[SheetRow]) -> Result<(), ConnectorError> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = format!("{}:append", a1_range(&handle.tab, "A1"));
        let url = self.url(
            &["spreadsheets", handle.sheet_id.as_str(), "values", range.as_str()],
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
        )?;
        let body = serde_json::json!({ "majorDimension": "ROWS", "values": rows });
        self.http
            .execute(&self.authorized(HttpRequest::post(url).json(body))?)
            .map(|_| ())
    }
}
