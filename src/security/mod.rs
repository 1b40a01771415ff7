//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_id.rs (X-Forwarded-For or peer IP)
//!     → rate_limit.rs (per-client fixed window)
//!     → [target resolution]
//!     → headers.rs (strip hop-by-hop, inject secrets)
//! Outgoing response:
//!     → cors.rs (Access-Control-Allow-* on every response)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; injected secrets always override it
//! - Rate limiter is one instance per process, passed by handle

pub mod client_id;
pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use cors::CorsPolicy;
pub use rate_limit::RateLimiter;
