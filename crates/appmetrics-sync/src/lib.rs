//! Per-app sync pipeline and the batch driver behind the `appmetrics-sync` binary.

mod pipeline;

pub use pipeline::{AppOutcome, BatchSummary, SkippedApp, run_app, run_batch};
