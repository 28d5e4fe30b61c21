//! Plain HTTP forwarding to the upstream dev server.
//!
//! # Responsibilities
//! - Replay the inbound request against the upstream target
//! - Stream both bodies without buffering
//! - Turn any upstream failure into `502 Upstream request failed`
//!
//! # Design Decisions
//! - No connection reuse: every request gets a fresh upstream connection
//! - No retries; a dev server that is down should be visible immediately

use std::error::Error as StdError;
use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::ProxyError;
use crate::http::request::ProxyRequest;
use crate::http::response::relay_response;
use crate::net::upstream::UpstreamTarget;
use crate::observability::metrics;
use crate::resilience::timeouts::{with_deadline, ProxyTimeouts};

pub type UpstreamClient = Client<HttpConnector, Body>;

/// Build the upstream client. Idle connections are never kept.
pub fn build_client(timeouts: &ProxyTimeouts) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(timeouts.connect));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build(connector)
}

#[derive(Clone)]
pub struct HttpForwarder {
    client: UpstreamClient,
    target: Arc<UpstreamTarget>,
    timeouts: ProxyTimeouts,
}

impl HttpForwarder {
    pub fn new(target: Arc<UpstreamTarget>, timeouts: ProxyTimeouts) -> Self {
        Self {
            client: build_client(&timeouts),
            target,
            timeouts,
        }
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Forward `request` and relay whatever the upstream answers.
    pub async fn forward(&self, request: ProxyRequest) -> Response {
        let method = request.method().clone();
        let path = request.path().to_string();

        match self.try_forward(request).await {
            Ok(response) => {
                tracing::debug!(
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    "Upstream responded"
                );
                response
            }
            Err(e) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    upstream = %self.target,
                    error = %e,
                    "Upstream error"
                );
                metrics::upstream_failure(e.kind());
                e.into_response()
            }
        }
    }

    async fn try_forward(&self, request: ProxyRequest) -> Result<Response, ProxyError> {
        let upstream_request = request.into_upstream(&self.target)?;
        let target = self.target.to_string();

        let response = with_deadline(&target, self.timeouts.response, async {
            self.client
                .request(upstream_request)
                .await
                .map_err(|e| ProxyError::UpstreamUnreachable {
                    target: target.clone(),
                    reason: error_chain(&e),
                })
        })
        .await?;

        Ok(relay_response(response))
    }
}

/// Render an error with all of its sources.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
