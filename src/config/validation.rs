//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (window and budget > 0, endpoint path)
//! - Check target definitions (URLs, methods, duplicate names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use url::Url;

use crate::config::schema::{ProxyConfig, SecretSource, TargetMode};
use crate::http::server::HEALTH_PATH;
use crate::routing::matcher::UrlPrefixMatcher;

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let endpoint = &config.listener.endpoint;
    if !endpoint.starts_with('/') {
        errors.push(ValidationError::new("listener.endpoint", "must start with '/'"));
    } else if endpoint == HEALTH_PATH {
        errors.push(ValidationError::new("listener.endpoint", "conflicts with the health route"));
    }

    if config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }
    if config.rate_limit.max_tracked_clients == 0 {
        errors.push(ValidationError::new("rate_limit.max_tracked_clients", "must be greater than 0"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than 0"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    for (field, value) in [
        ("cors.allow_origin", &config.cors.allow_origin),
        ("cors.allow_methods", &config.cors.allow_methods),
        ("cors.allow_headers", &config.cors.allow_headers),
    ] {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(field, "not a valid header value"));
        }
    }

    let mut names = HashSet::new();
    for (i, target) in config.targets.named.iter().enumerate() {
        let field = format!("targets.named[{}]", i);
        if target.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(target.name.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate name '{}'", target.name)));
        }
        check_upstream(&mut errors, &field, &target.upstream_url);
        check_methods(&mut errors, &field, &target.allowed_methods);
        check_headers(&mut errors, &field, target.inject_headers.iter());

        for rule in &target.query {
            let to = rule.to.as_deref().unwrap_or(&rule.from);
            if target.inject_query.contains_key(to) {
                errors.push(ValidationError::new(
                    &field,
                    format!("query parameter '{}' collides with an injected parameter", to),
                ));
            }
        }
    }

    for (i, entry) in config.targets.allowlist.iter().enumerate() {
        let field = format!("targets.allowlist[{}]", i);
        check_upstream(&mut errors, &field, &entry.prefix);
        if UrlPrefixMatcher::parse(&entry.prefix).is_err() {
            errors.push(ValidationError::new(&field, "prefix must be an absolute URL with a host"));
        }
        check_methods(&mut errors, &field, &entry.allowed_methods);
        check_headers(&mut errors, &field, entry.inject_headers.iter());
    }

    match config.targets.mode {
        TargetMode::Named if config.targets.named.is_empty() => {
            errors.push(ValidationError::new("targets.named", "named mode requires at least one target"));
        }
        TargetMode::Allowlist if config.targets.allowlist.is_empty() => {
            errors.push(ValidationError::new(
                "targets.allowlist",
                "allowlist mode requires at least one prefix",
            ));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream(errors: &mut Vec<ValidationError>, field: &str, url: &str) {
    match Url::parse(url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_methods(errors: &mut Vec<ValidationError>, field: &str, methods: &[String]) {
    if methods.is_empty() {
        errors.push(ValidationError::new(field, "allowed_methods must not be empty"));
    }
    for method in methods {
        if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
            errors.push(ValidationError::new(field, format!("invalid method '{}'", method)));
        }
    }
}

fn check_headers<'a>(
    errors: &mut Vec<ValidationError>,
    field: &str,
    headers: impl Iterator<Item = (&'a String, &'a SecretSource)>,
) {
    for (name, source) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, format!("invalid header name '{}'", name)));
        }
        if let SecretSource::Literal { value } = source {
            if HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::new(field, format!("invalid value for header '{}'", name)));
            }
        }
    }
}
