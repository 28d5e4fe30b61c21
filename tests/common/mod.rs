//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dev_proxy::config::ProxyConfig;
use dev_proxy::relay::SessionTracker;
use dev_proxy::{HttpServer, Shutdown};

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A port nothing is listening on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Upstream HTTP dev server stand-in.
///
/// - `/src/app.js` serves a tiny script
/// - `/echo-body` streams the request body back
/// - `/large?bytes=N` returns N bytes of `x`
/// - anything else answers with a JSON description of the request
pub async fn start_http_upstream() -> SocketAddr {
    let router = Router::new()
        .route("/src/app.js", get(app_js))
        .route("/echo-body", any(echo_body))
        .route("/large", get(large))
        .fallback(describe_request);
    serve(router).await
}

async fn app_js() -> Response {
    ([("content-type", "text/javascript")], "console.log(1)").into_response()
}

async fn echo_body(body: Body) -> Response {
    Response::new(body)
}

async fn large(uri: Uri) -> Vec<u8> {
    let bytes = uri
        .query()
        .and_then(|q| q.strip_prefix("bytes="))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1024);
    vec![b'x'; bytes]
}

async fn describe_request(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut described: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        described
            .entry(name.to_string())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": described,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Upstream WebSocket server stand-in.
///
/// Text `ping` is answered with `pong`, `whoami` with the request path and
/// query, `protocol` with the negotiated subprotocol and `close-me` with a
/// 4000 close. Everything else is echoed. Close frames received from the
/// proxy are reported on `closes`.
pub struct WsUpstream {
    pub addr: SocketAddr,
    pub closes: mpsc::UnboundedReceiver<Option<(u16, String)>>,
}

pub async fn start_ws_upstream() -> WsUpstream {
    let (tx, closes) = mpsc::unbounded_channel();
    let router = Router::new().fallback(move |ws: WebSocketUpgrade, uri: Uri| {
        let tx = tx.clone();
        async move {
            ws.protocols(["vite-hmr"])
                .on_upgrade(move |socket| ws_echo(socket, uri, tx))
        }
    });
    WsUpstream {
        addr: serve(router).await,
        closes,
    }
}

async fn ws_echo(
    mut socket: WebSocket,
    uri: Uri,
    closes: mpsc::UnboundedSender<Option<(u16, String)>>,
) {
    while let Some(Ok(message)) = socket.recv().await {
        let reply = match message {
            Message::Text(text) => match text.as_str() {
                "ping" => Message::text("pong"),
                "whoami" => Message::text(uri.to_string()),
                "protocol" => Message::text(
                    socket
                        .protocol()
                        .and_then(|p| p.to_str().ok())
                        .unwrap_or("none")
                        .to_string(),
                ),
                "close-me" => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: 4000,
                            reason: Utf8Bytes::from_static("bye"),
                        })))
                        .await;
                    return;
                }
                _ => Message::Text(text),
            },
            Message::Binary(data) => Message::Binary(data),
            Message::Close(frame) => {
                let _ = closes.send(frame.map(|f| (f.code, f.reason.as_str().to_string())));
                return;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if socket.send(reply).await.is_err() {
            return;
        }
    }
}

/// A running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub sessions: SessionTracker,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestProxy {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Local API used behind the proxy.
pub fn api_router() -> Router {
    Router::new().route("/api/hello", get(|| async { Json(json!({ "hello": "api" })) }))
}

pub fn proxy_config(upstream_port: u16) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.address = format!("127.0.0.1:{upstream_port}");
    config.timeouts.connect_secs = 2;
    config.timeouts.response_secs = 10;
    config
}

/// Start a proxy in front of `127.0.0.1:<upstream_port>`.
pub async fn start_proxy(upstream_port: u16) -> TestProxy {
    let server = HttpServer::new(proxy_config(upstream_port), api_router()).unwrap();
    let shutdown = server.shutdown();
    let sessions = server.sessions().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run(listener));

    TestProxy {
        addr,
        shutdown,
        sessions,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap()
}
