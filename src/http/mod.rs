//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → dispatcher.rs (preflight, rate limit, target resolution)
//!     → forwarder.rs (outbound request, single attempt with deadline)
//!     → response.rs (relay status/content-type/body, CORS)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{ForwardError, Forwarder, HttpForwarder, OutboundRequest, ProxyResponse};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
