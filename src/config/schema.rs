//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Secrets are never stored here directly: they are described by a
//! [`SecretSource`] and resolved once by the loader.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, endpoint path).
    pub listener: ListenerConfig,

    /// Per-client request budget.
    pub rate_limit: RateLimitConfig,

    /// Upstream timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// CORS response headers.
    pub cors: CorsConfig,

    /// Permitted upstream targets.
    pub targets: TargetsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path of the single proxy endpoint.
    pub endpoint: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            endpoint: "/api/proxy".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of one counting window in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per client within one window.
    pub max_requests: u32,

    /// Upper bound on the number of tracked client records.
    pub max_tracked_clients: usize,

    /// Interval between sweeps of expired records.
    pub sweep_interval_secs: u64,

    /// Use the first `X-Forwarded-For` entry as the client identity.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 30,
            max_tracked_clients: 100_000,
            sweep_interval_secs: 60,
            trust_forwarded_for: true,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for one upstream exchange in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum buffered request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// CORS headers attached to every response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    /// Preflight cache lifetime sent as `Access-Control-Max-Age`.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET,POST,OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
            max_age_secs: 86_400,
        }
    }
}

/// How the inbound request selects its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// `?api=<name>` looked up in `targets.named`.
    Named,
    /// `?link=<url>` checked against `targets.allowlist`.
    Allowlist,
}

/// Permitted upstream targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Active resolution mode.
    pub mode: TargetMode,

    /// Named upstream APIs.
    pub named: Vec<NamedTargetConfig>,

    /// URL prefixes accepted in allowlist mode.
    pub allowlist: Vec<AllowlistEntryConfig>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        let huggingface = NamedTargetConfig {
            name: "huggingface".to_string(),
            upstream_url: "https://api-inference.huggingface.co/models/j-hartmann/emotion-english-distilroberta-base".to_string(),
            allowed_methods: vec!["POST".to_string()],
            inject_headers: BTreeMap::from([
                (
                    "Authorization".to_string(),
                    SecretSource::Env {
                        env: "HF_TOKEN".to_string(),
                        prefix: "Bearer ".to_string(),
                    },
                ),
                (
                    "Content-Type".to_string(),
                    SecretSource::Literal {
                        value: "application/json".to_string(),
                    },
                ),
            ]),
            ..NamedTargetConfig::default()
        };

        let freesound = NamedTargetConfig {
            name: "freesound".to_string(),
            upstream_url: "https://freesound.org/apiv2/search/text/".to_string(),
            allowed_methods: vec!["GET".to_string()],
            query: vec![QueryParamConfig {
                from: "q".to_string(),
                to: Some("query".to_string()),
                required: true,
            }],
            static_query: BTreeMap::from([("fields".to_string(), "previews".to_string())]),
            inject_query: BTreeMap::from([(
                "token".to_string(),
                SecretSource::Env {
                    env: "FS_TOKEN".to_string(),
                    prefix: String::new(),
                },
            )]),
            ..NamedTargetConfig::default()
        };

        Self {
            mode: TargetMode::Named,
            named: vec![huggingface, freesound],
            allowlist: Vec::new(),
        }
    }
}

/// A named upstream API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NamedTargetConfig {
    /// Selector value (`?api=<name>`).
    pub name: String,

    /// Absolute upstream URL.
    pub upstream_url: String,

    /// Permitted inbound methods.
    pub allowed_methods: Vec<String>,

    /// Copy sanitized client headers to the upstream request.
    pub forward_client_headers: bool,

    /// Content type relayed when the upstream omits one.
    pub default_content_type: String,

    /// Headers added to every upstream request. Override client headers.
    pub inject_headers: BTreeMap<String, SecretSource>,

    /// Client query parameters copied to the upstream URL.
    pub query: Vec<QueryParamConfig>,

    /// Fixed query pairs appended to the upstream URL.
    pub static_query: BTreeMap<String, String>,

    /// Secret query pairs appended to the upstream URL.
    pub inject_query: BTreeMap<String, SecretSource>,
}

impl Default for NamedTargetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            upstream_url: String::new(),
            allowed_methods: vec!["GET".to_string()],
            forward_client_headers: false,
            default_content_type: default_content_type(),
            inject_headers: BTreeMap::new(),
            query: Vec::new(),
            static_query: BTreeMap::new(),
            inject_query: BTreeMap::new(),
        }
    }
}

/// One URL prefix accepted in allowlist mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AllowlistEntryConfig {
    /// Scheme, host and path prefix (e.g., "https://api.example.com/v1/").
    pub prefix: String,

    pub allowed_methods: Vec<String>,

    pub forward_client_headers: bool,

    pub default_content_type: String,

    pub inject_headers: BTreeMap<String, SecretSource>,

    pub inject_query: BTreeMap<String, SecretSource>,
}

impl Default for AllowlistEntryConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            allowed_methods: vec!["GET".to_string()],
            forward_client_headers: true,
            default_content_type: default_content_type(),
            inject_headers: BTreeMap::new(),
            inject_query: BTreeMap::new(),
        }
    }
}

/// Maps one client query parameter onto the upstream URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryParamConfig {
    /// Parameter name on the inbound request.
    pub from: String,

    /// Parameter name on the upstream URL (defaults to `from`).
    #[serde(default)]
    pub to: Option<String>,

    /// Reject the request when the parameter is missing or empty.
    #[serde(default)]
    pub required: bool,
}

/// Where an injected value comes from.
///
/// ```toml
/// Authorization = { env = "HF_TOKEN", prefix = "Bearer " }
/// Content-Type = { value = "application/json" }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SecretSource {
    /// Read from the process environment at startup.
    Env {
        env: String,
        #[serde(default)]
        prefix: String,
    },
    /// Literal value from the config file.
    Literal { value: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}
