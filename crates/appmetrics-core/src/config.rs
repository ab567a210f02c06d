//! Per-app configuration file and process-level settings.
//!
//! The apps file is a JSON array, loaded once per run and passed explicitly to every stage.
//! Every key is optional at parse time; gaps surface as [`SyncError::Configuration`] when the
//! stage that needs them runs, so one incomplete app never blocks the others.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::reconcile::DEFAULT_SPEND_LOOKBACK_DAYS;

pub const DEFAULT_CONFIG_FILE: &str = "apps_config.json";
const DEFAULT_APP_NAME: &str = "Unnamed";

static SHEET_LINK_ID: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").ok());

/// Service-account key as exported by the cloud console.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn is_usable(&self) -> bool {
        non_empty(&self.client_email).is_some() && non_empty(&self.private_key).is_some()
    }
}

/// Ad-platform credentials and account.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdsConfig {
    #[serde(default)]
    pub developer_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Manager account sent as the login customer.
    #[serde(default)]
    pub mcc_id: Option<String>,
}

impl std::fmt::Debug for AdsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsConfig")
            .field("customer_id", &self.customer_id)
            .field("mcc_id", &self.mcc_id)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

impl AdsConfig {
    /// Account id with the dashes of the console display form removed.
    pub fn customer_id(&self) -> Option<String> {
        non_empty(&self.customer_id).map(|id| id.replace('-', ""))
    }

    pub fn login_customer_id(&self) -> Option<String> {
        non_empty(&self.mcc_id).map(|id| id.replace('-', ""))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default, deserialize_with = "string_or_number")]
    pub property_id: Option<String>,
    #[serde(default)]
    pub service_account_info: Option<ServiceAccountKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    #[serde(default)]
    pub sheet_id: Option<String>,
    #[serde(default)]
    pub sheet_link: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
}

/// Resolved destination: spreadsheet id and tab name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub sheet_id: String,
    pub tab: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub gads: Option<AdsConfig>,
    #[serde(default)]
    pub ga4: Option<AnalyticsConfig>,
    #[serde(default)]
    pub service_account_info: Option<ServiceAccountKey>,
    #[serde(default)]
    pub campaign_prefix: Option<String>,
    #[serde(default)]
    pub date_range_days: Option<i64>,
    #[serde(default)]
    pub app_sheet: Option<SheetConfig>,
    #[serde(default)]
    pub sheets: Option<SheetConfig>,
}

impl AppConfig {
    pub fn name(&self) -> &str {
        non_empty(&self.app_name).unwrap_or(DEFAULT_APP_NAME)
    }

    pub fn ads(&self) -> Result<&AdsConfig, SyncError> {
        self.gads
            .as_ref()
            .ok_or_else(|| SyncError::configuration(format!("no ad platform settings for {}", self.name())))
    }

    pub fn campaign_prefix(&self) -> Option<&str> {
        non_empty(&self.campaign_prefix)
    }

    pub fn spend_lookback_days(&self) -> i64 {
        self.date_range_days
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_SPEND_LOOKBACK_DAYS)
    }

    pub fn analytics_property_id(&self) -> Result<&str, SyncError> {
        self.ga4
            .as_ref()
            .and_then(|ga4| non_empty(&ga4.property_id))
            .ok_or_else(|| SyncError::configuration(format!("no analytics property id for {}", self.name())))
    }

    pub fn analytics_credentials(&self) -> Result<&ServiceAccountKey, SyncError> {
        self.ga4
            .as_ref()
            .and_then(|ga4| ga4.service_account_info.as_ref())
            .filter(|key| key.is_usable())
            .ok_or_else(|| SyncError::configuration(format!("no analytics service account for {}", self.name())))
    }

    /// Service account used for the destination sheet: the app-level one, else the
    /// analytics one.
    pub fn sheet_credentials(&self) -> Result<&ServiceAccountKey, SyncError> {
        self.service_account_info
            .as_ref()
            .filter(|key| key.is_usable())
            .or_else(|| self.analytics_credentials().ok())
            .ok_or_else(|| SyncError::configuration(format!("no sheet service account for {}", self.name())))
    }

    /// Destination sheet, preferring the app-level block over the shared one. The id may be
    /// given directly or through a shareable link; the tab defaults to the app name.
    pub fn sheet_target(&self) -> Result<SheetTarget, SyncError> {
        let sheet = self.app_sheet.as_ref().or(self.sheets.as_ref());
        let sheet_id = sheet.and_then(|s| {
            non_empty(&s.sheet_id)
                .map(str::to_string)
                .or_else(|| non_empty(&s.sheet_link).and_then(extract_sheet_id))
        });
        let tab = sheet
            .and_then(|s| non_empty(&s.sheet_name))
            .or_else(|| non_empty(&self.app_name));
        match (sheet_id, tab) {
            (Some(sheet_id), Some(tab)) => Ok(SheetTarget {
                sheet_id,
                tab: tab.to_string(),
            }),
            _ => Err(SyncError::configuration(format!(
                "missing sheet id or tab name for {}",
                self.name()
            ))),
        }
    }
}

/// Spreadsheet id from a shareable link (`.../spreadsheets/d/<id>/edit`).
pub fn extract_sheet_id(link: &str) -> Option<String> {
    SHEET_LINK_ID
        .as_ref()?
        .captures(link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn parse_apps(json: &str) -> Result<Vec<AppConfig>, SyncError> {
    serde_json::from_str(json)
        .map_err(|e| SyncError::configuration(format!("apps config is not a JSON list of apps: {}", e)))
}

pub fn load_apps(path: &Path) -> Result<Vec<AppConfig>, SyncError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SyncError::configuration(format!("{}: {}", path.display(), e)))?;
    let apps = parse_apps(&raw)?;
    tracing::info!(
        event = "config.loaded",
        domain = "config",
        path = %path.display(),
        apps = apps.len() as u64
    );
    Ok(apps)
}

/// Load `.env` from `package_dir`, then the current dir. Missing files are fine.
pub fn init_env(package_dir: &Path) {
    let _ = dotenvy::from_path(package_dir.join(".env"));
    dotenvy::dotenv().ok();
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
pub fn get_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(event = "config.env_invalid", domain = "config", key = key);
                default
            }
        },
        Err(_) => default,
    }
}

/// Process settings, read from the environment after [`init_env`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub config_path: PathBuf,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            http_timeout: Duration::from_millis(30_000),
            http_max_retries: 2,
        }
    }
}

impl RuntimeSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            config_path: get_env("APPMETRICS_CONFIG", defaults.config_path),
            http_timeout: Duration::from_millis(get_env("APPMETRICS_HTTP_TIMEOUT_MS", 30_000u64)),
            http_max_retries: get_env("APPMETRICS_HTTP_MAX_RETRIES", defaults.http_max_retries),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
