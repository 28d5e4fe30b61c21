//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, classification)
//!     → API prefix?        → caller-supplied Router
//!     → WebSocket upgrade? → websocket.rs → relay session
//!     → otherwise          → forward.rs
//!                              → request.rs (rebuild for upstream)
//!                              → response.rs (relay status, headers, body)
//! ```

pub mod forward;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::HttpForwarder;
pub use request::{ProxyRequest, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use websocket::WebSocketTunnel;
