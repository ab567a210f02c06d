use appmetrics_connectors::{ConnectorFactory, fetch_daily_spend, fetch_revenue_window};
use appmetrics_core::reconcile::degraded_window;
use appmetrics_core::report::group_by_month;
use appmetrics_core::sheet::plan_append;
use appmetrics_core::{AppConfig, DailyMetricRecord, DailySpend, SheetState, SyncError};
use chrono::NaiveDate;
use tracing::{debug, info, info_span, warn};

/// Column holding dates and month headers.
const KEY_COLUMN: usize = 1;

/// What one app's sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOutcome {
    pub app: String,
    pub spend_days: usize,
    pub derived_records: usize,
    /// Data rows appended, excluding headers and separators.
    pub data_rows: usize,
    pub rows_appended: usize,
    pub new_months: Vec<String>,
    pub already_recorded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedApp {
    pub app: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub run_id: String,
    pub processed: Vec<AppOutcome>,
    pub skipped: Vec<SkippedApp>,
}

impl BatchSummary {
    pub fn rows_appended(&self) -> usize {
        self.processed.iter().map(|o| o.rows_appended).sum()
    }
}

fn fetch_spend(app: &AppConfig, connectors: &dyn ConnectorFactory, today: NaiveDate) -> DailySpend {
    let spend = connectors
        .spend_source(app)
        .and_then(|source| fetch_daily_spend(source.as_ref(), app, today));
    match spend {
        Ok(spend) => spend,
        Err(err) => {
            warn!(
                event = "pipeline.spend_unavailable",
                domain = "pipeline",
                kind = err.kind(),
                error = %err
            );
            DailySpend::new()
        }
    }
}

fn fetch_records(
    app: &AppConfig,
    connectors: &dyn ConnectorFactory,
    spend: &DailySpend,
    today: NaiveDate,
) -> Vec<DailyMetricRecord> {
    let source = app
        .analytics_property_id()
        .and_then(|property_id| Ok((property_id, connectors.revenue_source(app)?)));
    match source {
        Ok((property_id, source)) => fetch_revenue_window(source.as_ref(), property_id, spend, today),
        Err(err) => {
            warn!(
                event = "pipeline.revenue_unavailable",
                domain = "pipeline",
                kind = err.kind(),
                error = %err
            );
            degraded_window(today, spend)
        }
    }
}

/// Fetch, derive, group and merge for one app.
///
/// Spend and revenue problems degrade the data instead of failing. Only destination problems
/// (no sheet target, no credentials, tab missing, read or append rejected) return an error.
pub fn run_app(
    app: &AppConfig,
    connectors: &dyn ConnectorFactory,
    today: NaiveDate,
) -> Result<AppOutcome, SyncError> {
    let mut outcome = AppOutcome {
        app: app.name().to_string(),
        ..AppOutcome::default()
    };

    let spend = fetch_spend(app, connectors, today);
    outcome.spend_days = spend.len();

    let records = fetch_records(app, connectors, &spend, today);
    outcome.derived_records = records.len();
    if records.is_empty() {
        info!(event = "pipeline.nothing_to_write", domain = "pipeline");
        return Ok(outcome);
    }
    let buckets = group_by_month(records);

    let target = app.sheet_target()?;
    let store = connectors.sheet_store(app)?;
    let handle = store.open(&target).map_err(|e| e.into_destination())?;
    let column = store
        .read_column(&handle, KEY_COLUMN)
        .map_err(|e| e.into_destination())?;
    let state = SheetState::from_column(&column);
    debug!(
        event = "pipeline.sheet_state",
        domain = "pipeline",
        recorded_dates = state.recorded_dates().count() as u64,
        blank_rows = state.blank_rows() as u64,
        unrecognized_cells = state.unrecognized_cells() as u64
    );
    if state.unrecognized_cells() > 0 {
        warn!(
            event = "pipeline.unrecognized_cells",
            domain = "pipeline",
            count = state.unrecognized_cells() as u64
        );
    }

    let plan = plan_append(&state, &buckets);
    outcome.already_recorded = plan.skipped_dates;
    if !plan.is_empty() {
        store
            .append_rows(&handle, &plan.rows)
            .map_err(|e| e.into_destination())?;
    }
    outcome.data_rows = plan.data_rows;
    outcome.rows_appended = plan.rows.len();
    outcome.new_months = plan.new_months;
    info!(
        event = "pipeline.app_synced",
        domain = "pipeline",
        sheet_id = %target.sheet_id,
        tab = %target.tab,
        data_rows = outcome.data_rows as u64,
        rows_appended = outcome.rows_appended as u64,
        already_recorded = outcome.already_recorded as u64
    );
    Ok(outcome)
}

/// Runs every app in order. A failing app is logged and skipped; the batch always completes.
pub fn run_batch(apps: &[AppConfig], connectors: &dyn ConnectorFactory, today: NaiveDate) -> BatchSummary {
    let run_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("sync_run", run_id = %run_id);
    let _run = span.enter();
    info!(event = "pipeline.batch_started", domain = "pipeline", apps = apps.len() as u64, today = %today);

    let mut summary = BatchSummary {
        run_id,
        ..BatchSummary::default()
    };
    for app in apps {
        let app_span = info_span!("app", app = app.name());
        let _app = app_span.enter();
        match run_app(app, connectors, today) {
            Ok(outcome) => summary.processed.push(outcome),
            Err(err) => {
                warn!(
                    event = "pipeline.app_skipped",
                    domain = "pipeline",
                    kind = err.kind(),
                    error = %err
                );
                summary.skipped.push(SkippedApp {
                    app: app.name().to_string(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    info!(
        event = "pipeline.batch_finished",
        domain = "pipeline",
        processed = summary.processed.len() as u64,
        skipped = summary.skipped.len() as u64,
        rows_appended = summary.rows_appended() as u64
    );
    summary
}
