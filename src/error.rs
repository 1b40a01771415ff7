//! Crate-level error taxonomy.
//!
//! Every failure on the request path becomes a [`ProxyError`], which knows
//! its status code and JSON body. CORS headers are added by the relay.

use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::http::forwarder::ForwardError;
use crate::http::response::ErrorBody;
use crate::routing::resolver::RejectionReason;

/// Message returned with `429 Too Many Requests`.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests, please slow down.";

/// Why a request did not produce an upstream response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Too many requests, please slow down.")]
    RateLimited,

    #[error(transparent)]
    Rejected(#[from] RejectionReason),

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Rejected(reason) => reason.status(),
            ProxyError::Forward(ForwardError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Forward(ForwardError::BodyRead(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Forward(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body sent to the client.
    pub fn body(&self) -> ErrorBody {
        match self {
            ProxyError::RateLimited => ErrorBody::new(RATE_LIMITED_MESSAGE),
            ProxyError::Rejected(reason) => ErrorBody::new(reason.to_string()),
            ProxyError::Forward(err @ ForwardError::PayloadTooLarge { .. }) => ErrorBody::new(err.to_string()),
            ProxyError::Forward(ForwardError::BodyRead(_)) => ErrorBody::new("Failed to read request body."),
            ProxyError::Forward(err) => ErrorBody::with_details("Proxy failed", err.to_string()),
            ProxyError::Internal(details) => ErrorBody::with_details("Internal server error", details.clone()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let ProxyError::Rejected(RejectionReason::MethodNotAllowed { allowed, .. }) = &self {
            let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            if let Ok(allow) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, allow);
            }
        }
        response
    }
}
