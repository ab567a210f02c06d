//! Blocking JSON-over-HTTP with retries.
//!
//! [`HttpTransport`] sends exactly one request; [`JsonHttp`] owns the retry loop, status
//! classification and structured `http.*` events shared by every connector.

use std::sync::Arc;
use std::time::Duration;

use appmetrics_core::RuntimeSettings;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::ConnectorError;

const USER_AGENT: &str = "appmetrics/0.1";

/// Exponential retry policy for transient upstream failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first request.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_factor: f64,
    /// Upper bound for computed backoff.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 1_000,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
        }
    }

    pub fn exponential(max_retries: u32, initial_backoff_ms: u64, backoff_factor: f64) -> Self {
        let defaults = Self::none();
        Self {
            max_retries,
            initial_backoff_ms: if initial_backoff_ms == 0 {
                defaults.initial_backoff_ms
            } else {
                initial_backoff_ms
            },
            backoff_factor: if backoff_factor <= 0.0 {
                defaults.backoff_factor
            } else {
                backoff_factor
            },
            max_backoff_ms: defaults.max_backoff_ms,
        }
    }

    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms.max(1);
        self
    }

    pub fn can_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    pub fn backoff_duration(&self, retries_done: u32) -> Duration {
        if self.max_retries == 0 {
            return Duration::ZERO;
        }
        let exp = self.backoff_factor.powi(retries_done as i32);
        let base = (self.initial_backoff_ms as f64 * exp).round() as u64;
        Duration::from_millis(base.min(self.max_backoff_ms.max(1)))
    }
}

/// Timeout and retry settings applied to every connector.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from_runtime(&RuntimeSettings::default())
    }
}

impl HttpSettings {
    pub fn from_runtime(settings: &RuntimeSettings) -> Self {
        Self {
            timeout: settings.http_timeout,
            retry: RetryPolicy::exponential(settings.http_max_retries, 1_000, 2.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Body::Form(fields);
        self
    }

    fn host(&self) -> String {
        url_host(&self.url).unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Sends a single request. Errors are transport-level only; any received status is a response.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

/// Default transport on the reqwest blocking client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConnectorError::transport("http", e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };
        let resp = builder.send().map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| e.to_string())?;
        Ok(HttpResponse { status, body })
    }
}

/// Retrying JSON client for one provider.
#[derive(Clone)]
pub struct JsonHttp {
    provider: &'static str,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl JsonHttp {
    pub fn new(provider: &'static str, transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            transport,
            retry,
        }
    }

    /// Sends `request`, retrying transient failures, and returns the raw success body.
    pub fn execute(&self, request: &HttpRequest) -> Result<String, ConnectorError> {
        let mut retries_done = 0u32;
        loop {
            let attempt = retries_done + 1;
            debug!(
                event = "http.request_attempt",
                domain = "http",
                provider = self.provider,
                attempt = attempt,
                url_host = %request.host()
            );
            let err = match self.transport.send(request) {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    debug!(
                        event = "http.request_succeeded",
                        domain = "http",
                        provider = self.provider,
                        attempt = attempt,
                        response_bytes = resp.body.len() as u64
                    );
                    return Ok(resp.body);
                }
                Ok(resp) => ConnectorError::Http {
                    provider: self.provider,
                    status: resp.status,
                    body: resp.body,
                },
                Err(message) => ConnectorError::transport(self.provider, message),
            };

            let retryable = err.is_retryable();
            let can_retry = retryable && self.retry.can_retry(retries_done);
            debug!(
                event = "http.request_failed",
                domain = "http",
                provider = self.provider,
                code = err.code(),
                attempt = attempt,
                retryable = retryable,
                can_retry = can_retry,
                error = %err
            );
            if !can_retry {
                if retryable {
                    debug!(
                        event = "http.request_retry_exhausted",
                        domain = "http",
                        provider = self.provider,
                        code = err.code(),
                        attempt = attempt
                    );
                }
                return Err(err);
            }
            let backoff = self.retry.backoff_duration(retries_done);
            info!(
                event = "http.retry_scheduled",
                domain = "http",
                provider = self.provider,
                code = err.code(),
                attempt = attempt,
                next_attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64
            );
            std::thread::sleep(backoff);
            retries_done += 1;
        }
    }

    /// Like [`JsonHttp::execute`], decoding the body as `T`.
    pub fn execute_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T, ConnectorError> {
        let body = self.execute(request)?;
        serde_json::from_str(&body).map_err(|e| {
            ConnectorError::protocol(self.provider, format!("invalid response body: {}", e))
        })
    }
}

fn url_host(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed.host_str().map(str::to_string)
}
