use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Failure class that kept the retry loop going until the budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// Upstream answered HTTP 429.
    RateLimited,
    /// Upstream answered HTTP 500 or above.
    ServerError(u16),
    /// Connection, DNS, or timeout failure before a response arrived.
    Transport(String),
}

impl Display for RetryReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => f.write_str("rate limited (status 429)"),
            Self::ServerError(status) => write!(f, "server error (status {status})"),
            Self::Transport(detail) => write!(f, "transport error: {detail}"),
        }
    }
}

/// Terminal error surfaced to callers of a specialized client.
///
/// Exactly one of these is produced per logical call that does not yield a
/// decoded value. Intermediate retryable attempts never surface here; they
/// are logged and superseded by the next attempt's outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP 404. Definitive negative, never retried.
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// Any non-2xx status outside the retryable set. The response body is
    /// kept as diagnostic payload.
    #[error("upstream {destination} returned status {status}: {payload}")]
    Http {
        destination: String,
        status: u16,
        payload: String,
    },

    /// Malformed body for the selected decoder. Retrying will not fix
    /// malformed upstream content, so this is always fatal.
    #[error("malformed response from {destination}: {detail}")]
    Parse { destination: String, detail: String },

    /// Non-retryable transport failure (for example a request that could not
    /// be constructed at all).
    #[error("transport error contacting {destination}: {detail}")]
    Transport { destination: String, detail: String },

    /// Retry budget ran out on a retryable failure class.
    #[error("giving up on {destination} after {attempts} attempts: {last}")]
    RetriesExhausted {
        destination: String,
        attempts: u32,
        last: RetryReason,
    },

    /// The caller aborted the call. Does not consume retry budget.
    #[error("request cancelled by caller")]
    Cancelled,
}

impl ApiError {
    /// Status code of the HTTP response the failure originated from, if any.
    /// Absent for network, timeout, parse, and cancellation failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Http { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => match last {
                RetryReason::RateLimited => Some(429),
                RetryReason::ServerError(status) => Some(*status),
                RetryReason::Transport(_) => None,
            },
            _ => None,
        }
    }

    /// Raw response payload kept for diagnostics, when present.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Http { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
