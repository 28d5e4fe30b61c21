//! Timeout enforcement.
//!
//! # Design Decisions
//! - Every upstream call has a deadline: connect, then response headers
//! - Relay sessions close after a configurable quiet period
//! - Timeouts surface as `UpstreamTimeout`, which callers see as 502

use std::future::Future;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::ProxyError;

/// Resolved timeout values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyTimeouts {
    pub connect: Duration,
    pub response: Duration,
    /// `None` disables the idle timeout.
    pub idle: Option<Duration>,
}

impl ProxyTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            response: Duration::from_secs(config.response_secs),
            idle: (config.idle_secs > 0).then(|| Duration::from_secs(config.idle_secs)),
        }
    }
}

impl Default for ProxyTimeouts {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

/// Run `fut` against `target` with a deadline.
pub async fn with_deadline<F, T>(target: &str, limit: Duration, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::UpstreamTimeout {
            target: target.to_string(),
            after: limit,
        }),
    }
}
