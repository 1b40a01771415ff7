//! Target resolution.
//!
//! # Responsibilities
//! - Extract the selector from the inbound query (`api` or `link`)
//! - Look up the named target, or match the URL against the allowlist
//! - Check the inbound method against the target's allowed methods
//! - Produce the final upstream URL
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Runs strictly before any outbound call; an unmatched URL is never contacted
//! - Explicit rejection reasons rather than a silent default

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::routing::matcher::UrlPrefixMatcher;
use crate::routing::target::TargetSpec;

/// Query parameter carrying the API name in named mode.
pub const API_SELECTOR: &str = "api";

/// Query parameter carrying the target URL in allowlist mode.
pub const LINK_SELECTOR: &str = "link";

/// Why a request was refused before forwarding.
#[derive(Debug, Clone, Error)]
pub enum RejectionReason {
    #[error("Missing '{param}' query parameter.")]
    MissingSelector { param: &'static str },

    #[error("Unknown api param '{name}'; use {known}.")]
    UnknownTarget { name: String, known: String },

    #[error("Invalid 'link' URL: {reason}.")]
    MalformedUrl { reason: String },

    #[error("Target host '{host}' is not allowed.")]
    ForbiddenTarget { host: String },

    #[error("Method Not Allowed, use {}.", join_methods(.allowed))]
    MethodNotAllowed { method: Method, allowed: Vec<Method> },

    #[error("Missing '{param}' query parameter for {target}.")]
    MissingParameter { param: String, target: String },
}

impl RejectionReason {
    pub fn status(&self) -> StatusCode {
        match self {
            RejectionReason::MissingSelector { .. }
            | RejectionReason::UnknownTarget { .. }
            | RejectionReason::MalformedUrl { .. }
            | RejectionReason::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            RejectionReason::ForbiddenTarget { .. } => StatusCode::FORBIDDEN,
            RejectionReason::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectionReason::MissingSelector { .. } => "missing_selector",
            RejectionReason::UnknownTarget { .. } => "unknown_target",
            RejectionReason::MalformedUrl { .. } => "malformed_url",
            RejectionReason::ForbiddenTarget { .. } => "forbidden_target",
            RejectionReason::MethodNotAllowed { .. } => "method_not_allowed",
            RejectionReason::MissingParameter { .. } => "missing_parameter",
        }
    }
}

fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Decoded inbound query string.
#[derive(Debug, Clone, Default)]
pub struct ProxyQuery {
    pairs: Vec<(String, String)>,
}

impl ProxyQuery {
    pub fn parse(query: Option<&str>) -> Self {
        let pairs = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self { pairs }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn selector(&self, name: &'static str) -> Result<&str, RejectionReason> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or(RejectionReason::MissingSelector { param: name })
    }
}

/// One allowlisted URL prefix and the target it grants.
#[derive(Debug, Clone)]
pub struct AllowlistEntry {
    pub matcher: UrlPrefixMatcher,
    pub spec: Arc<TargetSpec>,
}

/// The configured targets, in the active resolution mode.
#[derive(Debug, Clone)]
pub enum TargetTable {
    Named(Vec<Arc<TargetSpec>>),
    Allowlist(Vec<AllowlistEntry>),
}

/// A target chosen for one request.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub spec: Arc<TargetSpec>,
    /// Final upstream URL including query.
    pub url: Url,
}

/// Maps inbound requests to permitted targets.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    table: TargetTable,
}

impl TargetResolver {
    pub fn new(table: TargetTable) -> Self {
        Self { table }
    }

    /// Resolve the target for `method` and the inbound `query`.
    pub fn resolve(&self, method: &Method, query: &ProxyQuery) -> Result<ResolvedTarget, RejectionReason> {
        match &self.table {
            TargetTable::Named(specs) => {
                let name = query.selector(API_SELECTOR)?;
                let spec = specs
                    .iter()
                    .find(|s| s.name == name)
                    .ok_or_else(|| RejectionReason::UnknownTarget {
                        name: name.to_string(),
                        known: specs
                            .iter()
                            .map(|s| format!("'{}'", s.name))
                            .collect::<Vec<_>>()
                            .join(" or "),
                    })?;

                spec.check_method(method)?;
                let url = spec.outbound_url(spec.upstream.clone(), query)?;
                Ok(ResolvedTarget {
                    spec: spec.clone(),
                    url,
                })
            }
            TargetTable::Allowlist(entries) => {
                let link = query.selector(LINK_SELECTOR)?;
                let url = Url::parse(link).map_err(|e| RejectionReason::MalformedUrl {
                    reason: e.to_string(),
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(RejectionReason::MalformedUrl {
                        reason: format!("unsupported scheme '{}'", url.scheme()),
                    });
                }

                let entry = entries
                    .iter()
                    .find(|e| e.matcher.matches(&url))
                    .ok_or_else(|| RejectionReason::ForbiddenTarget {
                        host: url.host_str().unwrap_or_default().to_string(),
                    })?;

                entry.spec.check_method(method)?;
                let url = entry.spec.outbound_url(url, query)?;
                Ok(ResolvedTarget {
                    spec: entry.spec.clone(),
                    url,
                })
            }
        }
    }
}
