//! Configuration loading from disk and target compilation.
//!
//! Secrets are resolved here, once, through a caller-supplied lookup
//! function. Nothing on the request path reads the process environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::{
    AllowlistEntryConfig, NamedTargetConfig, ProxyConfig, SecretSource, TargetMode, TargetsConfig,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::matcher::UrlPrefixMatcher;
use crate::routing::resolver::{AllowlistEntry, TargetTable};
use crate::routing::target::{QueryRule, Secret, TargetSpec};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Environment variable '{var}' required by target '{target}' is not set")]
    MissingSecret { var: String, target: String },

    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Invalid CORS header value: {0}")]
    InvalidCors(#[from] InvalidHeaderValue),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Compile the targets of the active mode, resolving secrets via `lookup`.
pub fn resolve_targets<F>(targets: &TargetsConfig, lookup: F) -> Result<TargetTable, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match targets.mode {
        TargetMode::Named => targets
            .named
            .iter()
            .map(|t| named_spec(t, &lookup).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .map(TargetTable::Named),
        TargetMode::Allowlist => targets
            .allowlist
            .iter()
            .map(|e| allowlist_entry(e, &lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(TargetTable::Allowlist),
    }
}

fn named_spec<F>(config: &NamedTargetConfig, lookup: &F) -> Result<TargetSpec, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let name = &config.name;
    let upstream = Url::parse(&config.upstream_url).map_err(|e| invalid(name, e))?;

    Ok(TargetSpec {
        name: name.clone(),
        upstream,
        allowed_methods: parse_methods(name, &config.allowed_methods)?,
        inject_headers: inject_headers(name, &config.inject_headers, lookup)?,
        forward_client_headers: config.forward_client_headers,
        default_content_type: HeaderValue::from_str(&config.default_content_type)
            .map_err(|e| invalid(name, e))?,
        query_rules: config
            .query
            .iter()
            .map(|q| QueryRule {
                from: q.from.clone(),
                to: q.to.clone().unwrap_or_else(|| q.from.clone()),
                required: q.required,
            })
            .collect(),
        static_query: config
            .static_query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        inject_query: inject_query(name, &config.inject_query, lookup)?,
    })
}

fn allowlist_entry<F>(config: &AllowlistEntryConfig, lookup: &F) -> Result<AllowlistEntry, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let name = &config.prefix;
    let upstream = Url::parse(name).map_err(|e| invalid(name, e))?;
    let matcher = UrlPrefixMatcher::parse(name).map_err(|e| invalid(name, e))?;

    let spec = TargetSpec {
        name: name.clone(),
        upstream,
        allowed_methods: parse_methods(name, &config.allowed_methods)?,
        inject_headers: inject_headers(name, &config.inject_headers, lookup)?,
        forward_client_headers: config.forward_client_headers,
        default_content_type: HeaderValue::from_str(&config.default_content_type)
            .map_err(|e| invalid(name, e))?,
        query_rules: Vec::new(),
        static_query: Vec::new(),
        inject_query: inject_query(name, &config.inject_query, lookup)?,
    };

    Ok(AllowlistEntry {
        matcher,
        spec: Arc::new(spec),
    })
}

fn parse_methods(target: &str, methods: &[String]) -> Result<Vec<Method>, ConfigError> {
    methods
        .iter()
        .map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|e| invalid(target, e)))
        .collect()
}

fn inject_headers<F>(
    target: &str,
    sources: &BTreeMap<String, SecretSource>,
    lookup: &F,
) -> Result<HeaderMap, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut headers = HeaderMap::new();
    for (name, source) in sources {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(target, e))?;
        let secret = resolve_secret(target, source, lookup)?;
        let mut value = HeaderValue::from_str(secret.expose()).map_err(|e| invalid(target, e))?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }
    Ok(headers)
}

fn inject_query<F>(
    target: &str,
    sources: &BTreeMap<String, SecretSource>,
    lookup: &F,
) -> Result<Vec<(String, Secret)>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    sources
        .iter()
        .map(|(name, source)| Ok((name.clone(), resolve_secret(target, source, lookup)?)))
        .collect()
}

fn resolve_secret<F>(target: &str, source: &SecretSource, lookup: &F) -> Result<Secret, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match source {
        SecretSource::Literal { value } => Ok(Secret::new(value.clone())),
        SecretSource::Env { env, prefix } => lookup(env)
            .filter(|v| !v.is_empty())
            .map(|v| Secret::new(format!("{}{}", prefix, v)))
            .ok_or_else(|| ConfigError::MissingSecret {
                var: env.clone(),
                target: target.to_string(),
            }),
    }
}

fn invalid(target: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidTarget {
        target: target.to_string(),
        reason: err.to_string(),
    }
}
