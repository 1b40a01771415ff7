//! Response relay.
//!
//! # Responsibilities
//! - Copy upstream status, content type and body to the client
//! - Render proxy errors as JSON
//! - Attach CORS headers to every response
//!
//! # Design Decisions
//! - Body bytes are relayed unmodified (no transcoding)
//! - Upstream non-2xx statuses are relayed, not treated as proxy failures
//! - Only the content type is copied from upstream headers

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::http::forwarder::ProxyResponse;
use crate::security::cors::CorsPolicy;

/// JSON error payload: `{"error": ..., "details": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Relay an upstream reply to the client.
pub fn relay(upstream: ProxyResponse, cors: &CorsPolicy) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, upstream.content_type);
    if let Some(encoding) = upstream.content_encoding {
        response.headers_mut().insert(header::CONTENT_ENCODING, encoding);
    }
    cors.apply(response.headers_mut());
    response
}

/// Render a proxy error for the client.
pub fn reject(err: ProxyError, cors: &CorsPolicy) -> Response {
    let mut response = err.into_response();
    cors.apply(response.headers_mut());
    response
}
