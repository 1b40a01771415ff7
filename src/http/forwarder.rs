//! Upstream forwarding.
//!
//! # Responsibilities
//! - Read the inbound body with a size cap
//! - Build the outbound request (method, sanitized headers, body)
//! - Issue it once with a deadline and collect the upstream reply
//!
//! # Design Decisions
//! - GET/HEAD never carry a body upstream
//! - Redirects are not followed; the upstream's answer is relayed as-is
//! - Error descriptions never include the upstream URL (it may carry secrets)

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use thiserror::Error;
use url::Url;

use crate::config::schema::TimeoutConfig;
use crate::resilience::timeouts::with_deadline;
use crate::routing::resolver::ResolvedTarget;
use crate::security::headers::outbound_headers;

/// Failures while preparing or performing the upstream call.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Request body exceeds {limit} bytes.")]
    PayloadTooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::PayloadTooLarge { .. } => "payload_too_large",
            ForwardError::BodyRead(_) => "body_read",
            ForwardError::Unreachable(_) => "unreachable",
            ForwardError::Timeout(_) => "timeout",
        }
    }
}

/// A fully prepared upstream request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub default_content_type: HeaderValue,
}

/// What the upstream answered.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: HeaderValue,
    /// Upstream `Content-Encoding`, relayed so encoded bodies stay decodable.
    pub content_encoding: Option<HeaderValue>,
    pub body: Bytes,
}

/// Issues outbound requests.
pub trait Forwarder: Send + Sync {
    fn forward(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ProxyResponse, ForwardError>>;
}

/// Build the outbound request for `target` from the inbound parts.
pub async fn prepare(
    target: &ResolvedTarget,
    method: &Method,
    client_headers: &HeaderMap,
    body: Body,
    max_body_bytes: usize,
) -> Result<OutboundRequest, ForwardError> {
    let body = if method == Method::GET || method == Method::HEAD {
        None
    } else {
        Some(read_body(client_headers, body, max_body_bytes).await?)
    };

    Ok(OutboundRequest {
        method: method.clone(),
        url: target.url.clone(),
        headers: outbound_headers(client_headers, &target.spec),
        body,
        default_content_type: target.spec.default_content_type.clone(),
    })
}

/// Read the inbound body chunk by chunk, failing once it exceeds `limit`.
pub async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, ForwardError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ForwardError::PayloadTooLarge { limit });
    }

    let mut stream = body.into_data_stream();
    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ForwardError::BodyRead(e.to_string()))?;
        if buffer.len() + chunk.len() > limit {
            return Err(ForwardError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

/// [`Forwarder`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    connect_timeout: Duration,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            connect_timeout,
            timeout,
        })
    }

    pub fn from_config(config: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            Duration::from_secs(config.connect_secs),
            Duration::from_secs(config.upstream_secs),
        )
    }

    fn classify(&self, err: reqwest::Error) -> ForwardError {
        if err.is_connect() && err.is_timeout() {
            return ForwardError::Unreachable(format!("connect timed out after {:?}", self.connect_timeout));
        }
        if err.is_timeout() {
            return ForwardError::Timeout(self.timeout);
        }
        ForwardError::Unreachable(describe(err.without_url()))
    }

    async fn exchange(&self, request: OutboundRequest) -> Result<ProxyResponse, ForwardError> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
            default_content_type,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or(default_content_type);
        let content_encoding = response.headers().get(header::CONTENT_ENCODING).cloned();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(ProxyResponse {
            status,
            content_type,
            content_encoding,
            body,
        })
    }
}

impl Forwarder for HttpForwarder {
    fn forward(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ProxyResponse, ForwardError>> {
        Box::pin(async move {
            with_deadline(self.timeout, self.exchange(request))
                .await
                .unwrap_or_else(|elapsed| Err(ForwardError::Timeout(elapsed.after)))
        })
    }
}

/// Error message including its source chain.
fn describe(err: impl StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
