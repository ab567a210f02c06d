use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "appmetrics.logs.jsonl";

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Where and how much to log, resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    pub filter: Option<String>,
    pub json_path: Option<PathBuf>,
}

impl LogSettings {
    /// - `APPMETRICS_OBSERVABILITY_ENABLED`: on/off switch, default on.
    /// - `APPMETRICS_LOG_LEVEL`: filter directive; otherwise `RUST_LOG`, otherwise `info`.
    /// - `APPMETRICS_JSON_LOG_PATH`: JSON-lines file; unset means compact stdout output.
    pub fn from_env() -> Self {
        let enabled = std::env::var("APPMETRICS_OBSERVABILITY_ENABLED")
            .ok()
            .map(|v| parse_flag(&v).unwrap_or(true))
            .unwrap_or(true);
        Self {
            enabled,
            filter: std::env::var("APPMETRICS_LOG_LEVEL").ok(),
            json_path: std::env::var("APPMETRICS_JSON_LOG_PATH").ok().map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(filter) = self.filter.as_deref()
            && let Ok(filter) = EnvFilter::try_new(filter)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Safe to call more than once; only the first call counts.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = settings.env_filter();
        match settings.json_path.as_deref() {
            Some(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
            }
            None => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stdout);
                let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
            }
        }
    });
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}
