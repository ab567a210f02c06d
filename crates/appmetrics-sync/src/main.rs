//! Scheduled entry point: sync every configured app once.

use std::path::Path;

use anyhow::Context;
use appmetrics_connectors::{GoogleConnectors, HttpSettings};
use appmetrics_core::{RuntimeSettings, config, observability};

fn main() -> anyhow::Result<()> {
    config::init_env(Path::new(env!("CARGO_MANIFEST_DIR")));
    observability::init_observability();

    let settings = RuntimeSettings::from_env();
    let apps = config::load_apps(&settings.config_path)
        .with_context(|| format!("loading apps from {}", settings.config_path.display()))?;
    let connectors = GoogleConnectors::new(HttpSettings::from_runtime(&settings))
        .context("building http client")?;

    let today = chrono::Local::now().date_naive();
    let summary = appmetrics_sync::run_batch(&apps, &connectors, today);
    tracing::info!(
        event = "pipeline.exit",
        domain = "pipeline",
        run_id = %summary.run_id,
        skipped = summary.skipped.len() as u64
    );
    Ok(())
}
