//! Development reverse proxy.
//!
//! One listening port in front of a frontend dev server: requests under the
//! API prefix go to an in-process Axum router, everything else (including
//! WebSocket upgrades for hot reload) is forwarded to the upstream.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
