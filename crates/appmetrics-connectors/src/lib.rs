//! External collaborators of the sync pipeline, each behind a trait so the pipeline can run
//! against scripted fakes:
//!
//! - [`SpendSource`]: per-campaign daily cost from the ad platform;
//! - [`RevenueSource`]: per-date revenue and purchase-event reports from the analytics platform;
//! - [`SheetStore`]: read column / append rows on the destination spreadsheet.
//!
//! [`GoogleConnectors`] builds the blocking HTTP implementations from an app's configuration.

pub mod ads;
pub mod analytics;
pub mod auth;
mod error;
mod factory;
pub mod http;
pub mod sheets;

pub use ads::{GoogleAdsSpendSource, SpendQuery, SpendRow, SpendSource, fetch_daily_spend};
pub use analytics::{Ga4RevenueSource, RevenueSource, fetch_revenue_window};
pub use error::ConnectorError;
pub use factory::{ConnectorFactory, GoogleConnectors};
pub use http::{HttpSettings, JsonHttp, RetryPolicy};
pub use sheets::{GoogleSheetsStore, SheetHandle, SheetStore};
