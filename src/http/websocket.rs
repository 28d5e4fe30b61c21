//! WebSocket tunnelling to the upstream dev server.
//!
//! # Responsibilities
//! - Refuse upgrades the inbound connection cannot carry (501)
//! - Complete the handshake with the client
//! - Open the matching upstream WebSocket on the same path and query
//! - Hand both sockets to a [`RelaySession`]
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - The upstream connection is opened only after the client upgrade succeeded
//! - An upstream that cannot be reached closes the client socket with 1011
//! - Subprotocols offered by the client are offered upstream as well

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as UpstreamRequest;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::http::headers::{is_websocket_handshake_header, requested_protocols, strip_hop_by_hop};
use crate::net::upstream::UpstreamTarget;
use crate::observability::metrics;
use crate::relay::message::{downstream_halves, upstream_halves};
use crate::relay::{Lifecycle, RelaySession, SessionState, SessionTracker};
use crate::resilience::timeouts::{with_deadline, ProxyTimeouts};

/// Upper bound for delivering the 1011 close to a client whose upstream
/// could not be reached.
const REJECT_CLOSE_GRACE: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Clone)]
pub struct WebSocketTunnel {
    target: Arc<UpstreamTarget>,
    timeouts: ProxyTimeouts,
    sessions: SessionTracker,
    shutdown: CancellationToken,
}

impl WebSocketTunnel {
    pub fn new(
        target: Arc<UpstreamTarget>,
        timeouts: ProxyTimeouts,
        sessions: SessionTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            target,
            timeouts,
            sessions,
            shutdown,
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Answer an upgrade request.
    ///
    /// Returns 101 when the client upgrade is accepted; relaying then runs
    /// in the background. Returns 501 when the connection cannot be
    /// upgraded at all, or the extractor's own 4xx for malformed handshakes.
    pub async fn tunnel(&self, request: Request<Body>) -> Response {
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.advance(SessionState::UpgradeCheck);

        let (mut parts, _body) = request.into_parts();

        if parts.extensions.get::<OnUpgrade>().is_none() {
            return reject(&lifecycle, ProxyError::UpgradeUnsupported);
        }

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(WebSocketUpgradeRejection::ConnectionNotUpgradable(_)) => {
                return reject(&lifecycle, ProxyError::UpgradeUnsupported);
            }
            Err(rejection) => {
                lifecycle.advance(SessionState::Rejected);
                tracing::warn!(
                    path = %parts.uri.path(),
                    reason = %rejection.body_text(),
                    "Malformed WebSocket handshake"
                );
                return rejection.into_response();
            }
        };

        let upstream_request = match upstream_handshake(&self.target, &parts) {
            Ok(request) => request,
            Err(e) => return reject(&lifecycle, e),
        };
        lifecycle.advance(SessionState::Upgrading);

        let protocols = requested_protocols(&parts.headers);
        let upgrade = if protocols.is_empty() {
            upgrade
        } else {
            upgrade.protocols(protocols)
        };

        let failed = Arc::clone(&lifecycle);
        let tunnel = self.clone();
        let span = tracing::Span::current();

        upgrade
            .on_failed_upgrade(move |e| {
                failed.advance(SessionState::Rejected);
                tracing::warn!(error = %e, "Client upgrade failed");
            })
            .on_upgrade(move |socket| {
                tunnel
                    .relay(socket, upstream_request, lifecycle)
                    .instrument(span)
            })
    }

    async fn relay(self, socket: WebSocket, request: UpstreamRequest, lifecycle: Arc<Lifecycle>) {
        let guard = self.sessions.track();
        let session_id = guard.id();
        lifecycle.advance(SessionState::Connecting);

        let target = self.target.to_string();
        let connected = with_deadline(&target, self.timeouts.connect, async {
            tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| ProxyError::UpstreamUnreachable {
                    target: target.clone(),
                    reason: e.to_string(),
                })
        })
        .await;

        let upstream = match connected {
            Ok((upstream, _response)) => upstream,
            Err(e) => {
                lifecycle.advance(SessionState::Rejected);
                tracing::warn!(
                    session_id = %session_id,
                    upstream = %self.target,
                    error = %e,
                    "Upstream WebSocket connect failed"
                );
                metrics::upstream_failure(e.kind());
                close_with_error(socket).await;
                return;
            }
        };

        lifecycle.advance(SessionState::Open);
        tracing::info!(session_id = %session_id, upstream = %self.target, "WebSocket tunnel open");

        RelaySession::new(guard, lifecycle, &self.shutdown, self.timeouts.idle)
            .run(downstream_halves(socket), upstream_halves(upstream))
            .await;
    }
}

fn reject(lifecycle: &Lifecycle, error: ProxyError) -> Response {
    lifecycle.advance(SessionState::Rejected);
    tracing::warn!(error = %error, "WebSocket upgrade rejected");
    error.into_response()
}

/// Build the upstream handshake for the same path and query, carrying the
/// client's end-to-end headers.
fn upstream_handshake(target: &UpstreamTarget, parts: &Parts) -> Result<UpstreamRequest, ProxyError> {
    let uri = target.ws_uri(parts.uri.path_and_query())?;
    let mut request = uri
        .into_client_request()
        .map_err(|e| ProxyError::InvalidUpstreamRequest(e.to_string()))?;

    let mut forwarded = parts.headers.clone();
    strip_hop_by_hop(&mut forwarded);
    for (name, value) in forwarded.iter() {
        if name == HOST || is_websocket_handshake_header(name) {
            continue;
        }
        request.headers_mut().append(name.clone(), value.clone());
    }
    Ok(request)
}

async fn close_with_error(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: close_code::ERROR,
        reason: Utf8Bytes::from_static(""),
    };
    let sent = tokio::time::timeout(REJECT_CLOSE_GRACE, socket.send(Message::Close(Some(frame)))).await;
    if !matches!(sent, Ok(Ok(()))) {
        tracing::debug!("Client went away before the close frame was sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NOT_IMPLEMENTED_BODY;
    use axum::http::StatusCode;

    fn tunnel() -> WebSocketTunnel {
        WebSocketTunnel::new(
            Arc::new(UpstreamTarget::parse("localhost:5173").unwrap()),
            ProxyTimeouts::default(),
            SessionTracker::new(),
            CancellationToken::new(),
        )
    }

    fn handshake() -> axum::http::request::Builder {
        Request::builder()
            .uri("/hmr?token=abc")
            .header("host", "localhost:3000")
            .header("connection", "Upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
    }

    #[tokio::test]
    async fn test_not_upgradable_is_not_implemented() {
        let request = handshake().body(Body::empty()).unwrap();
        let response = tunnel().tunnel(request).await;

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], NOT_IMPLEMENTED_BODY.as_bytes());
    }

    #[test]
    fn test_upstream_handshake_keeps_path_and_end_to_end_headers() {
        let target = UpstreamTarget::parse("localhost:5173").unwrap();
        let (parts, _) = handshake()
            .header("origin", "http://localhost:3000")
            .header("cookie", "sid=7")
            .header("sec-websocket-protocol", "vite-hmr")
            .body(())
            .unwrap()
            .into_parts();

        let request = upstream_handshake(&target, &parts).unwrap();

        assert_eq!(request.uri().to_string(), "ws://localhost:5173/hmr?token=abc");
        let headers = request.headers();
        assert_eq!(headers["host"], "localhost:5173");
        assert_eq!(headers["origin"], "http://localhost:3000");
        assert_eq!(headers["cookie"], "sid=7");
        assert_eq!(headers["sec-websocket-protocol"], "vite-hmr");
        assert_eq!(headers.get_all("sec-websocket-key").iter().count(), 1);
        assert_ne!(headers["sec-websocket-key"], "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(headers.get_all("upgrade").iter().count(), 1);
    }
}
