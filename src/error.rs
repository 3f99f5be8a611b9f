//! Error types for the price hub

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when fetching data from the upstream provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection-level failure (DNS, TLS, reset, body read)
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request did not complete within the client timeout
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Any other non-2xx response
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body was not the JSON shape we expected
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The refresh task was torn down before it produced a response
    #[error("Refresh cancelled")]
    Cancelled,
}

/// Failure classes the rest of the system cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    UpstreamStatus,
    MalformedResponse,
}

impl ProviderError {
    /// Maps a reqwest error, keeping timeouts distinguishable
    pub fn from_request(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err)
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Cancelled => FailureKind::Transport,
            Self::RateLimitExceeded | Self::Status { .. } => FailureKind::UpstreamStatus,
            Self::Malformed(_) => FailureKind::MalformedResponse,
        }
    }

    /// Creates a Malformed error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// A push to a subscriber that could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection side of the channel is gone
    #[error("subscriber disconnected")]
    Disconnected,

    /// The subscriber did not drain its queue in time
    #[error("subscriber send timed out")]
    TimedOut,
}

/// Errors returned to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("upstream error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(ProviderError::RateLimitExceeded) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(ProviderError::Status { status: 404, .. }) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Upstream(e) = &self {
            tracing::warn!(error = %e, kind = ?e.kind(), "Upstream request failed");
        }

        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
