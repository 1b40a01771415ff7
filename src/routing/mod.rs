//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound query (?api=<name> | ?link=<url>) + method
//!     → resolver.rs (selector extraction, lookup, method check)
//!     → matcher.rs (allowlist prefix match, allowlist mode only)
//!     → Return: ResolvedTarget (TargetSpec + final URL) or RejectionReason
//!
//! Target Compilation (at startup):
//!     TargetsConfig
//!     → config::loader resolves secrets, parses URLs and methods
//!     → target.rs TargetSpec, frozen behind Arc
//! ```
//!
//! # Design Decisions
//! - Targets compiled at startup, immutable at runtime
//! - No regex (prefix matching only)
//! - Resolution never performs I/O

pub mod matcher;
pub mod resolver;
pub mod target;

pub use resolver::{ProxyQuery, RejectionReason, ResolvedTarget, TargetResolver, TargetTable};
pub use target::{Secret, TargetSpec};
