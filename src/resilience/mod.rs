//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (enforce connect/exchange deadline)
//!     → On failure: surfaced to the dispatcher as 500 "Proxy failed"
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: fail fast and let the client retry

pub mod timeouts;
