//! URL allowlist matching.
//!
//! # Responsibilities
//! - Match scheme and port exactly
//! - Match host exactly (hosts are lowercased by URL parsing)
//! - Match path prefix on segment boundaries
//!
//! # Design Decisions
//! - URLs carrying credentials never match
//! - Path matching is case-sensitive
//! - No regex; a prefix is a parsed URL

use url::Url;

/// Matches absolute URLs against one allowlisted prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPrefixMatcher {
    scheme: String,
    host: String,
    port: Option<u16>,
    path_prefix: String,
}

impl UrlPrefixMatcher {
    /// Create a matcher from an allowlist entry such as
    /// `https://api.example.com/v1/`.
    pub fn parse(prefix: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(prefix)?;
        let host = url.host_str().ok_or(url::ParseError::EmptyHost)?.to_string();

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port_or_known_default(),
            path_prefix: url.path().to_string(),
        })
    }

    pub fn matches(&self, url: &Url) -> bool {
        if url.scheme() != self.scheme {
            return false;
        }
        if !url.username().is_empty() || url.password().is_some() {
            return false;
        }
        if url.host_str() != Some(self.host.as_str()) || url.port_or_known_default() != self.port {
            return false;
        }

        let path = url.path();
        if self.path_prefix.ends_with('/') {
            return path.starts_with(&self.path_prefix);
        }
        path.strip_prefix(&self.path_prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}
