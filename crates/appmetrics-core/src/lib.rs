//! Core of the daily app-metrics sync: turns raw per-day spend and revenue into derived
//! performance rows and plans append-only writes into per-app tracking sheets.
//!
//! Nothing in this crate performs network I/O. External collaborators (ad platform,
//! analytics platform, spreadsheet store) live in `appmetrics-connectors`.

pub mod config;
pub mod derive;
pub mod error;
pub mod model;
pub mod observability;
pub mod reconcile;
pub mod report;
pub mod sheet;

pub use config::{AppConfig, RuntimeSettings, SheetTarget};
pub use error::SyncError;
pub use model::{DailyMetricRecord, DailySpend, RenewalDay, RevenueDay, TrailingWindowMetrics};
pub use reconcile::LookbackWindow;
pub use report::{CellValue, MonthKey, MonthlyBuckets, SheetRow};
pub use sheet::{AppendPlan, SheetCell, SheetState};
