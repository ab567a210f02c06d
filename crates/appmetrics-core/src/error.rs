/// Failure kinds of a per-app sync. None of them is fatal to the batch: the driver logs
/// the kind and moves on to the next app.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Missing account id, credentials or sheet target.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An upstream platform query failed or returned something unparseable.
    #[error("upstream query failed ({upstream}): {message}")]
    UpstreamQuery { upstream: String, message: String },
    /// The destination sheet or tab could not be opened, read or appended to.
    #[error("destination access failed: {0}")]
    DestinationAccess(String),
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn upstream(upstream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamQuery {
            upstream: upstream.into(),
            message: message.into(),
        }
    }

    pub fn destination(message: impl Into<String>) -> Self {
        Self::DestinationAccess(message.into())
    }

    /// Stable code used in structured log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::UpstreamQuery { .. } => "upstream_query",
            Self::DestinationAccess(_) => "destination_access",
        }
    }
}
