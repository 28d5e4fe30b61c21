//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Build the Axum router with its middleware (request ID, tracing)
//! - Classify each request: application API or dev server
//! - Hand API requests to the caller-supplied router
//! - Tunnel WebSocket upgrades, forward everything else
//! - Serve until shutdown, then drain relay sessions

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::http::forward::HttpForwarder;
use crate::http::headers::is_websocket_upgrade;
use crate::http::request::{request_id, ProxyRequest, UuidRequestId};
use crate::http::websocket::WebSocketTunnel;
use crate::lifecycle::Shutdown;
use crate::net::upstream::UpstreamTarget;
use crate::observability::metrics;
use crate::relay::SessionTracker;
use crate::resilience::timeouts::ProxyTimeouts;
use crate::routing::{PathClassifier, Route};

/// How long `run` waits for relay sessions to close after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<PathClassifier>,
    pub api: Router,
    pub forwarder: HttpForwarder,
    pub tunnel: WebSocketTunnel,
}

/// HTTP server for the development proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    target: Arc<UpstreamTarget>,
    sessions: SessionTracker,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a server that sends API-prefixed requests to `api` and
    /// everything else to the configured upstream.
    pub fn new(config: ProxyConfig, api: Router) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let target = Arc::new(
            UpstreamTarget::parse(&config.upstream.address)
                .map_err(|e| ConfigError::Validation(vec![e.into()]))?,
        );
        let timeouts = ProxyTimeouts::from_config(&config.timeouts);
        let sessions = SessionTracker::new();
        let shutdown = Shutdown::new();

        let state = AppState {
            classifier: Arc::new(PathClassifier::new(config.routing.api_prefix.clone())),
            api,
            forwarder: HttpForwarder::new(Arc::clone(&target), timeouts),
            tunnel: WebSocketTunnel::new(
                Arc::clone(&target),
                timeouts,
                sessions.clone(),
                shutdown.token(),
            ),
        };

        Ok(Self {
            router: Self::build_router(state),
            config,
            target,
            sessions,
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router, for serving or for `oneshot` in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Handle that stops the server and every relay session.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.target,
            api_prefix = %self.config.routing.api_prefix,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        if !self.sessions.wait_for_drain_within(DRAIN_TIMEOUT).await {
            tracing::warn!(
                remaining = self.sessions.active_count(),
                "Relay sessions still open after drain deadline"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request.headers()),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Single entry point for every inbound request.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let (kind, response) = match state.classifier.classify(request.uri().path()) {
        Route::Local => {
            let response = match state.api.clone().oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            ("local", response)
        }
        Route::Proxy if is_websocket_upgrade(request.headers()) => {
            tracing::debug!("Tunnelling WebSocket upgrade");
            ("websocket", state.tunnel.tunnel(request).await)
        }
        Route::Proxy => {
            tracing::debug!("Forwarding to upstream");
            let response = state.forwarder.forward(ProxyRequest::capture(request)).await;
            ("http", response)
        }
    };

    metrics::record_request(&method, response.status().as_u16(), kind, start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;

    fn api() -> Router {
        Router::new().route("/api/ping", get(|| async { "pong" }))
    }

    #[tokio::test]
    async fn test_api_prefix_is_served_locally() {
        let server = HttpServer::new(ProxyConfig::default(), api()).unwrap();

        let response = server
            .router()
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn test_unknown_api_route_is_not_proxied() {
        let server = HttpServer::new(ProxyConfig::default(), api()).unwrap();

        let response = server
            .router()
            .oneshot(Request::builder().uri("/api/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ProxyConfig::default();
        config.upstream.address = "http://localhost:5173".into();
        assert!(matches!(
            HttpServer::new(config, api()),
            Err(ConfigError::Validation(_))
        ));
    }
}
