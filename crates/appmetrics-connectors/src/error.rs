use appmetrics_core::SyncError;

/// Failure talking to an external platform, before it is mapped to a pipeline error kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// Credentials missing, malformed, or rejected by the token endpoint.
    #[error("auth error ({provider}): {message}")]
    Auth { provider: &'static str, message: String },
    /// Non-success HTTP status.
    #[error("http error ({provider}): status={status} body={body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },
    /// The platform rejected the request and listed its reasons.
    #[error("request rejected ({provider}): {}", .reasons.join("; "))]
    Rejected {
        provider: &'static str,
        reasons: Vec<String>,
    },
    /// Connection, timeout or body read failure.
    #[error("transport error ({provider}): {message}")]
    Transport { provider: &'static str, message: String },
    /// The response did not have the expected shape.
    #[error("protocol error ({provider}): {message}")]
    Protocol { provider: &'static str, message: String },
    /// A named resource (spreadsheet tab) does not exist.
    #[error("not found ({provider}): {message}")]
    NotFound { provider: &'static str, message: String },
}

impl ConnectorError {
    pub fn auth(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Auth {
            provider,
            message: message.into(),
        }
    }

    pub fn transport(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            provider,
            message: message.into(),
        }
    }

    pub fn protocol(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider,
            message: message.into(),
        }
    }

    pub fn not_found(provider: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            provider,
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Self::Auth { provider, .. }
            | Self::Http { provider, .. }
            | Self::Rejected { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::NotFound { provider, .. } => provider,
        }
    }

    /// Stable classification code for log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth.invalid_credentials",
            Self::Http { status: 401, .. } => "http.auth.401",
            Self::Http { status: 403, .. } => "http.forbidden.403",
            Self::Http { status: 404, .. } => "http.not_found.404",
            Self::Http { status: 429, .. } => "http.rate_limited.429",
            Self::Http { status, .. } if *status >= 500 => "http.server_error.5xx",
            Self::Http { .. } => "http.invalid_request",
            Self::Rejected { .. } => "platform.rejected",
            Self::Transport { message, .. } if is_timeout(message) => "http.timeout",
            Self::Transport { .. } => "http.transport",
            Self::Protocol { .. } => "protocol.unexpected_shape",
            Self::NotFound { .. } => "resource.not_found",
        }
    }

    /// Whether sending the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Individual failure reasons, one per entry reported by the platform.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Self::Rejected { reasons, .. } => reasons.clone(),
            other => vec![other.to_string()],
        }
    }

    pub fn into_upstream(self) -> SyncError {
        SyncError::upstream(self.provider(), self.to_string())
    }

    pub fn into_destination(self) -> SyncError {
        SyncError::destination(self.to_string())
    }
}

fn is_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timed out") || lower.contains("timeout")
}
