//! Token-injecting reverse proxy.
//!
//! A single endpoint relays browser requests to a fixed set of upstream
//! APIs, attaching credentials that never reach the client and applying a
//! per-client fixed-window rate limit.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
