use std::sync::Arc;

use appmetrics_core::config::ServiceAccountKey;
use appmetrics_core::{AppConfig, SyncError};

use crate::ads::{GoogleAdsSpendSource, SpendSource};
use crate::analytics::{Ga4RevenueSource, RevenueSource};
use crate::auth::{
    ANALYTICS_READONLY_SCOPE, RefreshTokenProvider, SPREADSHEETS_SCOPE, ServiceAccountTokenProvider,
};
use crate::error::ConnectorError;
use crate::http::{HttpSettings, HttpTransport, JsonHttp, ReqwestTransport};
use crate::sheets::{GoogleSheetsStore, SheetStore};

/// Builds the external collaborators for one app from its configuration.
///
/// Missing or unusable credentials surface as [`SyncError::Configuration`] so the pipeline can
/// skip just the affected source.
pub trait ConnectorFactory {
    fn spend_source(&self, app: &AppConfig) -> Result<Box<dyn SpendSource>, SyncError>;
    fn revenue_source(&self, app: &AppConfig) -> Result<Box<dyn RevenueSource>, SyncError>;
    fn sheet_store(&self, app: &AppConfig) -> Result<Box<dyn SheetStore>, SyncError>;
}

/// Google Ads, GA4 Data API and Sheets over one shared blocking HTTP transport.
pub struct GoogleConnectors {
    settings: HttpSettings,
    transport: Arc<dyn HttpTransport>,
}

impl GoogleConnectors {
    pub fn new(settings: HttpSettings) -> Result<Self, ConnectorError> {
        let transport = Arc::new(ReqwestTransport::new(settings.timeout)?);
        Ok(Self::with_transport(settings, transport))
    }

    pub fn with_transport(settings: HttpSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self { settings, transport }
    }

    fn http(&self, provider: &'static str) -> JsonHttp {
        JsonHttp::new(provider, self.transport.clone(), self.settings.retry.clone())
    }

    fn service_account(
        &self,
        app: &AppConfig,
        key: &ServiceAccountKey,
        scope: &str,
    ) -> Result<Arc<ServiceAccountTokenProvider>, SyncError> {
        ServiceAccountTokenProvider::new(self.http("oauth"), key, scope)
            .map(Arc::new)
            .map_err(|e| SyncError::configuration(format!("{}: {}", app.name(), e)))
    }
}

impl ConnectorFactory for GoogleConnectors {
    fn spend_source(&self, app: &AppConfig) -> Result<Box<dyn SpendSource>, SyncError> {
        let ads = app.ads()?;
        let developer_token = ads
            .developer_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::configuration(format!("no ads developer token for {}", app.name())))?;
        let tokens = RefreshTokenProvider::new(self.http("oauth"), ads)
            .map_err(|e| SyncError::configuration(format!("{}: {}", app.name(), e)))?;
        Ok(Box::new(GoogleAdsSpendSource::new(
            self.http("google_ads"),
            Arc::new(tokens),
            developer_token,
            ads.login_customer_id(),
        )))
    }

    fn revenue_source(&self, app: &AppConfig) -> Result<Box<dyn RevenueSource>, SyncError> {
        let key = app.analytics_credentials()?;
        let tokens = self.service_account(app, key, ANALYTICS_READONLY_SCOPE)?;
        Ok(Box::new(Ga4RevenueSource::new(self.http("ga4"), tokens)))
    }

    fn sheet_store(&self, app: &AppConfig) -> Result<Box<dyn SheetStore>, SyncError> {
        let key = app.sheet_credentials()?;
        let tokens = self.service_account(app, key, SPREADSHEETS_SCOPE)?;
        Ok(Box::new(GoogleSheetsStore::new(self.http("sheets"), tokens)))
    }
}
