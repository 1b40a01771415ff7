//! Token-injecting reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http::server ──▶ http::dispatcher
//!                                        │
//!                                        ├─▶ security::rate_limit   (429)
//!                                        ├─▶ routing::resolver      (400/403/405)
//!                                        └─▶ http::forwarder ──────────────▶ Upstream API
//!                                                │  + injected secrets
//!     Client Response                            ▼
//!     ◀───────────── http::response (status, content-type, body, CORS)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use token_proxy::config::{load_config, resolve_targets, validate_config, ConfigError, ProxyConfig};
use token_proxy::http::{AppState, HttpForwarder, HttpServer};
use token_proxy::lifecycle::{wait_for_signal, Shutdown};
use token_proxy::observability::{init_logging, init_metrics};
use token_proxy::routing::TargetResolver;

#[derive(Parser, Debug)]
#[command(name = "token-proxy", version, about = "Rate-limited reverse proxy that injects upstream API credentials")]
struct Args {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "TOKEN_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = ProxyConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "token-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoint = %config.listener.endpoint,
        mode = ?config.targets.mode,
        window_ms = config.rate_limit.window_ms,
        max_requests = config.rate_limit.max_requests,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let table = resolve_targets(&config.targets, |var| std::env::var(var).ok())?;
    let resolver = TargetResolver::new(table);
    let forwarder = Arc::new(HttpForwarder::from_config(&config.timeouts)?);
    let state = AppState::new(&config, resolver, forwarder)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    HttpServer::new(config, state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
