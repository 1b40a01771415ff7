//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → loader::resolve_targets (secrets read once, compiled TargetTable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, resolve_targets, ConfigError};
pub use schema::{
    AllowlistEntryConfig, CorsConfig, LimitsConfig, ListenerConfig, LogFormat, NamedTargetConfig,
    ObservabilityConfig, ProxyConfig, QueryParamConfig, RateLimitConfig, SecretSource, TargetMode,
    TargetsConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
