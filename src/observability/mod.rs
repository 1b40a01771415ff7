//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the TraceLayer span
//! - Metric calls are no-ops until an exporter is installed
//! - Log lines never carry upstream URLs or injected credentials

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
