//! Resolved upstream targets.
//!
//! A [`TargetSpec`] is the immutable, fully-resolved form of one configured
//! target: URL parsed, methods parsed, secrets read. Built once by the config
//! loader and shared via `Arc` for the life of the process.

use std::fmt;

use axum::http::{HeaderMap, HeaderValue, Method};
use url::{form_urlencoded, Url};

use crate::routing::resolver::{ProxyQuery, RejectionReason};

/// A secret value that must not appear in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for placing on the outbound request only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Copies one inbound query parameter to the upstream URL.
#[derive(Debug, Clone)]
pub struct QueryRule {
    pub from: String,
    pub to: String,
    pub required: bool,
}

/// One permitted upstream.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// Selector name, or the allowlist prefix.
    pub name: String,

    /// Upstream URL (named mode) or allowlisted prefix (allowlist mode).
    pub upstream: Url,

    pub allowed_methods: Vec<Method>,

    /// Headers set on every outbound request. Values are marked sensitive.
    pub inject_headers: HeaderMap,

    pub forward_client_headers: bool,

    /// Relayed when the upstream response has no content type.
    pub default_content_type: HeaderValue,

    pub query_rules: Vec<QueryRule>,

    pub static_query: Vec<(String, String)>,

    pub inject_query: Vec<(String, Secret)>,
}

impl TargetSpec {
    pub fn allows(&self, method: &Method) -> bool {
        self.allowed_methods.iter().any(|m| m == method)
    }

    pub fn check_method(&self, method: &Method) -> Result<(), RejectionReason> {
        if self.allows(method) {
            Ok(())
        } else {
            Err(RejectionReason::MethodNotAllowed {
                method: method.clone(),
                allowed: self.allowed_methods.clone(),
            })
        }
    }

    /// Build the outbound URL from `base` and the inbound query.
    ///
    /// Mapped client parameters and static pairs come first; injected secret
    /// pairs are appended last and replace any pair of the same name. Without
    /// mapping rules or static pairs the query of `base` is kept byte for byte.
    pub fn outbound_url(&self, base: Url, inbound: &ProxyQuery) -> Result<Url, RejectionReason> {
        if self.query_rules.is_empty() && self.static_query.is_empty() {
            return Ok(self.append_secrets(base));
        }

        let mut pairs: Vec<(String, String)> = base.query_pairs().into_owned().collect();

        for rule in &self.query_rules {
            match inbound.get(&rule.from).filter(|v| !v.is_empty()) {
                Some(value) => pairs.push((rule.to.clone(), value.to_string())),
                None if rule.required => {
                    return Err(RejectionReason::MissingParameter {
                        param: rule.from.clone(),
                        target: self.name.clone(),
                    });
                }
                None => {}
            }
        }

        pairs.extend(self.static_query.iter().cloned());
        pairs.retain(|(name, _)| !self.inject_query.iter().any(|(secret, _)| secret == name));

        let mut url = base;
        if pairs.is_empty() && self.inject_query.is_empty() {
            url.set_query(None);
            return Ok(url);
        }

        {
            let mut serializer = url.query_pairs_mut();
            serializer.clear();
            for (name, value) in &pairs {
                serializer.append_pair(name, value);
            }
            for (name, secret) in &self.inject_query {
                serializer.append_pair(name, secret.expose());
            }
        }
        Ok(url)
    }

    /// Append the injected pairs to the raw query of `url`, dropping raw
    /// segments whose decoded name collides with one of them.
    fn append_secrets(&self, mut url: Url) -> Url {
        if self.inject_query.is_empty() {
            return url;
        }

        let mut segments: Vec<String> = url
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter(|segment| !self.is_injected(&segment_name(segment)))
            .map(str::to_string)
            .collect();

        let mut secrets = form_urlencoded::Serializer::new(String::new());
        for (name, secret) in &self.inject_query {
            secrets.append_pair(name, secret.expose());
        }
        segments.push(secrets.finish());

        url.set_query(Some(&segments.join("&")));
        url
    }

    fn is_injected(&self, name: &str) -> bool {
        self.inject_query.iter().any(|(secret, _)| secret == name)
    }
}

/// Decoded name of one raw `name=value` query segment.
fn segment_name(segment: &str) -> String {
    let raw = segment.split('=').next().unwrap_or_default();
    form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(name, _)| name.into_owned())
        .unwrap_or_default()
}
