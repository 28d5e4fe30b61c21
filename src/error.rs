//! Error taxonomy for the proxy core.
//!
//! Every failure is caught at the boundary of the component that produced it
//! and turned into a bounded outcome: a fixed status code for HTTP callers, or
//! a connection closure for relay sessions.

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Body returned when the upstream target cannot be reached.
pub const BAD_GATEWAY_BODY: &str = "Upstream request failed";

/// Body returned when the inbound transport cannot be upgraded.
pub const NOT_IMPLEMENTED_BODY: &str = "WebSocket upgrade not supported";

/// Body returned when the outbound request could not be built.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// One side of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Client ↔ proxy.
    Downstream,
    /// Proxy ↔ asset dev server.
    Upstream,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Downstream => f.write_str("downstream"),
            Side::Upstream => f.write_str("upstream"),
        }
    }
}

/// Errors raised while forwarding or tunnelling a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("inbound connection cannot be upgraded")]
    UpgradeUnsupported,

    #[error("upstream {target} unreachable: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    #[error("upstream {target} did not answer within {after:?}")]
    UpstreamTimeout { target: String, after: Duration },

    #[error("relay i/o error on {side} connection: {message}")]
    RelayIo { side: Side, message: String },

    #[error("relay session idle for {0:?}")]
    IdleTimeout(Duration),

    #[error("invalid upstream request: {0}")]
    InvalidUpstreamRequest(String),
}

impl ProxyError {
    /// Wrap a transport error raised on an open relay connection.
    pub fn relay(side: Side, err: impl fmt::Display) -> Self {
        ProxyError::RelayIo {
            side,
            message: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UpgradeUnsupported => StatusCode::NOT_IMPLEMENTED,
            ProxyError::UpstreamUnreachable { .. } | ProxyError::UpstreamTimeout { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::RelayIo { .. }
            | ProxyError::IdleTimeout(_)
            | ProxyError::InvalidUpstreamRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::UpgradeUnsupported => "upgrade_unsupported",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::UpstreamTimeout { .. } => "upstream_timeout",
            ProxyError::RelayIo { .. } => "relay_io",
            ProxyError::IdleTimeout(_) => "idle_timeout",
            ProxyError::InvalidUpstreamRequest(_) => "invalid_upstream_request",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match status {
            StatusCode::BAD_GATEWAY => BAD_GATEWAY_BODY,
            StatusCode::NOT_IMPLEMENTED => NOT_IMPLEMENTED_BODY,
            _ => INTERNAL_ERROR_BODY,
        };
        (status, body).into_response()
    }
}
