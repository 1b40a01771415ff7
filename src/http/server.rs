//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy endpoint and health route
//! - Wire up middleware (request ID, tracing, panic capture)
//! - Own the per-process state handed to every request
//! - Bind server to listener and run until shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::loader::ConfigError;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::dispatcher::proxy_handler;
use crate::http::forwarder::Forwarder;
use crate::http::request::{MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::response::reject;
use crate::lifecycle::Shutdown;
use crate::routing::TargetResolver;
use crate::security::{CorsPolicy, RateLimiter};

/// Path of the liveness route.
pub const HEALTH_PATH: &str = "/healthz";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub resolver: Arc<TargetResolver>,
    pub forwarder: Arc<dyn Forwarder>,
    pub cors: Arc<CorsPolicy>,
    pub max_body_bytes: usize,
    pub trust_forwarded_for: bool,
}

impl AppState {
    /// Build the state once at startup.
    pub fn new(
        config: &ProxyConfig,
        resolver: TargetResolver,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, ConfigError> {
        let cors = CorsPolicy::from_config(&config.cors)?;

        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            resolver: Arc::new(resolver),
            forwarder,
            cors: Arc::new(cors),
            max_body_bytes: config.limits.max_body_bytes,
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
        })
    }
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and state.
    pub fn new(config: ProxyConfig, state: AppState) -> Self {
        let router = build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoint = %self.config.listener.endpoint,
            "HTTP server starting"
        );

        let sweep_interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1));
        let sweeper = self
            .state
            .rate_limiter
            .clone()
            .spawn_sweeper(sweep_interval, shutdown.subscribe());

        let mut stop = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        shutdown.trigger();
        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Rate limit sweeper ended abnormally");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &ProxyConfig, state: AppState) -> Router {
    let cors = state.cors.clone();

    Router::new()
        .route(&config.listener.endpoint, any(proxy_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
                    panic_response(panic, &cors)
                })),
        )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, cors: &CorsPolicy) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %message, "Request handler panicked");

    reject(ProxyError::Internal("unexpected failure".to_string()), cors)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "tracked_clients": state.rate_limiter.tracked_clients(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TimeoutConfig;
    use crate::http::forwarder::HttpForwarder;
    use crate::routing::TargetTable;

    #[test]
    fn test_bad_cors_value_is_a_cors_error() {
        let mut config = ProxyConfig::default();
        config.cors.allow_origin = "bad\nvalue".into();
        let forwarder = Arc::new(HttpForwarder::from_config(&TimeoutConfig::default()).unwrap());

        let err = AppState::new(&config, TargetResolver::new(TargetTable::Named(Vec::new())), forwarder)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidCors(_)), "{}", err);
        assert!(err.to_string().starts_with("Invalid CORS header value"));
    }
}
