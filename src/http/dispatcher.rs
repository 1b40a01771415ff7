//! Per-request orchestration.
//!
//! Stages run in order and stop at the first failure:
//! preflight → rate limit → target resolution → forwarding → relay.
//! Every exit, including errors, carries CORS headers.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request};
use axum::response::Response;

use crate::error::ProxyError;
use crate::http::forwarder::{self, ProxyResponse};
use crate::http::request::request_id;
use crate::http::response::{reject, relay};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::resolver::ProxyQuery;
use crate::security::client_id::client_id;

/// Handler for the proxy endpoint.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();

    // Preflight bypasses every other check.
    if method == Method::OPTIONS {
        tracing::debug!(request_id = %request_id, "Answering CORS preflight");
        let response = state.cors.preflight();
        metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
        return response;
    }

    let response = match dispatch(&state, &request_id, request).await {
        Ok(upstream) => relay(upstream, &state.cors),
        Err(err) => reject(err, &state.cors),
    };

    let status = response.status();
    metrics::record_request(method.as_str(), status.as_u16(), start_time);
    tracing::info!(
        request_id = %request_id,
        method = %method,
        status = status.as_u16(),
        latency_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );
    response
}

async fn dispatch(state: &AppState, request_id: &str, request: Request<Body>) -> Result<ProxyResponse, ProxyError> {
    // 1. Rate limit
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(request.headers(), peer, state.trust_forwarded_for);

    if !state.rate_limiter.admit(&client) {
        tracing::warn!(request_id = %request_id, client = %client, "Rate limit exceeded");
        metrics::record_rate_limited();
        return Err(ProxyError::RateLimited);
    }

    // 2. Resolve target
    let query = ProxyQuery::parse(request.uri().query());
    let target = state
        .resolver
        .resolve(request.method(), &query)
        .map_err(|reason| {
            tracing::warn!(request_id = %request_id, client = %client, reason = %reason, "Request rejected");
            metrics::record_rejection(reason.kind());
            reason
        })?;

    // 3. Forward
    let (parts, body) = request.into_parts();
    let outbound = forwarder::prepare(&target, &parts.method, &parts.headers, body, state.max_body_bytes)
        .await
        .map_err(|err| {
            tracing::warn!(request_id = %request_id, client = %client, error = %err, "Request body refused");
            metrics::record_rejection(err.kind());
            err
        })?;

    tracing::debug!(
        request_id = %request_id,
        target = %target.spec.name,
        method = %parts.method,
        "Forwarding request"
    );

    state.forwarder.forward(outbound).await.map_err(|err| {
        tracing::error!(
            request_id = %request_id,
            target = %target.spec.name,
            error = %err,
            "Upstream request failed"
        );
        metrics::record_upstream_error(err.kind());
        ProxyError::from(err)
    })
}
