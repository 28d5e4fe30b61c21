//! dev-proxy
//!
//! One port in front of a frontend dev server and an in-process API.
//!
//! ```text
//!                       ┌────────────────────────────────────────────┐
//!                       │                 DEV PROXY                  │
//!   Browser request     │  ┌─────────┐   ┌────────────┐              │
//!   ────────────────────┼─▶│  http   │──▶│ classifier │              │
//!                       │  │ server  │   └─────┬──────┘              │
//!                       │  └─────────┘         │                     │
//!                       │        /api/... ◀────┼────▶ everything else│
//!                       │           │          │            │        │
//!                       │           ▼          │            ▼        │
//!                       │   ┌──────────────┐   │   ┌────────────────┐│
//!                       │   │ local Router │   │   │ forward / ws   ││──▶ Dev server
//!                       │   └──────────────┘   │   │ tunnel (relay) ││    (Vite etc.)
//!                       │                      │   └────────────────┘│
//!                       └────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use axum::{routing::get, Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use dev_proxy::config::{parse_config, validate_config, ConfigError, ProxyConfig};
use dev_proxy::lifecycle::signals::spawn_signal_handler;
use dev_proxy::observability::{logging, metrics};
use dev_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "dev-proxy")]
#[command(about = "Single-port proxy for a frontend dev server and a local API", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:3000.
    #[arg(long)]
    bind: Option<String>,

    /// Upstream dev server as host:port.
    #[arg(long)]
    upstream: Option<String>,

    /// Path prefix served by the local API.
    #[arg(long)]
    api_prefix: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => parse_config(&std::fs::read_to_string(path)?)?,
            None => ProxyConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(upstream) = self.upstream {
            config.upstream.address = upstream;
        }
        if let Some(prefix) = self.api_prefix {
            config.routing.api_prefix = prefix;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// The application API served under the prefix.
fn api_router(prefix: &str) -> Router {
    let health = format!("{}/health", prefix.trim_end_matches('/'));
    Router::new().route(&health, get(health_handler))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability);

    tracing::info!("dev-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        api_prefix = %config.routing.api_prefix,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let api = api_router(&config.routing.api_prefix);
    let server = HttpServer::new(config, api)?;

    spawn_signal_handler(server.shutdown());
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
