//! OAuth access tokens for the Google APIs.
//!
//! Analytics and Sheets authenticate with a service-account key (signed JWT exchanged for a
//! token); the ads API uses an installed-app refresh token. Tokens are cached until shortly
//! before they expire.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use appmetrics_core::config::{AdsConfig, ServiceAccountKey};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;
use crate::http::{HttpRequest, JsonHttp};

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3_600;
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Supplies a bearer token for each request.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Result<String, ConnectorError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Default)]
struct TokenCache(Mutex<Option<CachedToken>>);

impl TokenCache {
    fn get_or_fetch(
        &self,
        fetch: impl FnOnce() -> Result<TokenResponse, ConnectorError>,
    ) -> Result<String, ConnectorError> {
        let mut slot = self
            .0
            .lock()
            .map_err(|_| ConnectorError::auth("oauth", "token cache poisoned"))?;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }
        let token = fetch()?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3_600));
        *slot = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });
        Ok(token.access_token)
    }
}

/// Service-account JWT-bearer flow.
pub struct ServiceAccountTokenProvider {
    http: JsonHttp,
    client_email: String,
    encoding_key: Arc<EncodingKey>,
    key_id: Option<String>,
    token_uri: String,
    scope: String,
    cache: TokenCache,
}

impl ServiceAccountTokenProvider {
    pub fn new(http: JsonHttp, key: &ServiceAccountKey, scope: &str) -> Result<Self, ConnectorError> {
        let client_email = key
            .client_email
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConnectorError::auth("oauth", "service account has no client_email"))?;
        let pem = key
            .private_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConnectorError::auth("oauth", "service account has no private_key"))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| ConnectorError::auth("oauth", format!("unreadable private key: {}", e)))?;
        Ok(Self {
            http,
            client_email: client_email.to_string(),
            encoding_key: Arc::new(encoding_key),
            key_id: key.private_key_id.clone(),
            token_uri: key
                .token_uri
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
            scope: scope.to_string(),
            cache: TokenCache::default(),
        })
    }

    fn assertion(&self) -> Result<String, ConnectorError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ConnectorError::auth("oauth", format!("cannot sign assertion: {}", e)))
    }
}

impl AccessTokenProvider for ServiceAccountTokenProvider {
    fn access_token(&self) -> Result<String, ConnectorError> {
        self.cache.get_or_fetch(|| {
            let request = HttpRequest::post(&self.token_uri).form(vec![
                ("grant_type".to_string(), JWT_BEARER_GRANT.to_string()),
                ("assertion".to_string(), self.assertion()?),
            ]);
            tracing::debug!(
                event = "auth.token_requested",
                domain = "auth",
                flow = "service_account",
                scope = %self.scope
            );
            self.http.execute_json(&request)
        })
    }
}

/// Installed-app refresh-token flow used by the ads API.
pub struct RefreshTokenProvider {
    http: JsonHttp,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
    cache: TokenCache,
}

impl RefreshTokenProvider {
    pub fn new(http: JsonHttp, ads: &AdsConfig) -> Result<Self, ConnectorError> {
        let field = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ConnectorError::auth("oauth", format!("ads credentials have no {}", name)))
        };
        Ok(Self {
            client_id: field(&ads.client_id, "client_id")?,
            client_secret: field(&ads.client_secret, "client_secret")?,
            refresh_token: field(&ads.refresh_token, "refresh_token")?,
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            http,
            cache: TokenCache::default(),
        })
    }
}

impl AccessTokenProvider for RefreshTokenProvider {
    fn access_token(&self) -> Result<String, ConnectorError> {
        self.cache.get_or_fetch(|| {
            let request = HttpRequest::post(&self.token_uri).form(vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("client_id".to_string(), self.client_id.clone()),
                ("client_secret".to_string(), self.client_secret.clone()),
                ("refresh_token".to_string(), self.refresh_token.clone()),
            ]);
            tracing::debug!(event = "auth.token_requested", domain = "auth", flow = "refresh_token");
            self.http.execute_json(&request).map_err(|err| match err {
                ConnectorError::Http { status, body, .. } if status == 400 || status == 401 => {
                    ConnectorError::auth("oauth", format!("refresh rejected ({}): {}", status, body))
                }
                other => other,
            })
        })
    }
}

/// Fixed token, for tests and pre-authorised environments.
pub struct StaticToken(pub String);

impl AccessTokenProvider for StaticToken {
    fn access_token(&self) -> Result<String, ConnectorError> {
        Ok(self.0.clone())
    }
}
