//! End-to-end tests: real server, real forwarder, raw TCP upstream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tokio::net::TcpListener;

use token_proxy::config::{NamedTargetConfig, ProxyConfig, SecretSource};
use token_proxy::http::HttpForwarder;

mod common;
use common::{MockReply, MockUpstream, FS_SECRET, HF_SECRET};

fn target(upstream_url: String) -> NamedTargetConfig {
    NamedTargetConfig {
        name: "echo".into(),
        upstream_url,
        allowed_methods: vec!["GET".into(), "POST".into()],
        forward_client_headers: true,
        inject_headers: [(
            "Authorization".to_string(),
            SecretSource::Env {
                env: "HF_TOKEN".into(),
                prefix: "Bearer ".into(),
            },
        )]
        .into(),
        inject_query: [(
            "key".to_string(),
            SecretSource::Env {
                env: "FS_TOKEN".into(),
                prefix: String::new(),
            },
        )]
        .into(),
        ..NamedTargetConfig::default()
    }
}

fn config(upstream_url: String) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.targets.named = vec![target(upstream_url)];
    config
}

fn forwarder(config: &ProxyConfig) -> Arc<HttpForwarder> {
    Arc::new(HttpForwarder::from_config(&config.timeouts).unwrap())
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().pool_max_idle_per_host(0).build().unwrap()
}

#[tokio::test]
async fn test_injects_credentials_and_strips_hop_headers() {
    let upstream = MockUpstream::start(200, Some("application/json"), r#"{"label":"joy"}"#).await;
    let config = config(upstream.url("/v1/classify"));
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let response = client()
        .post(format!("http://{}/api/proxy?api=echo&key=client-key", addr))
        .header("Authorization", "Bearer client-token")
        .header("Proxy-Authorization", "Basic c2VjcmV0")
        .header("X-Custom", "kept")
        .body(r#"{"inputs":"I love this"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.text().await.unwrap(), r#"{"label":"joy"}"#);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let raw = requests[0].to_ascii_lowercase();
    assert!(
        raw.starts_with(&format!("post /v1/classify?key={} http/1.1\r\n", FS_SECRET)),
        "{}",
        raw
    );
    assert!(raw.contains(&format!("\r\nauthorization: bearer {}\r\n", HF_SECRET)), "{}", raw);
    assert!(!raw.contains("client-token"));
    assert!(!raw.contains("client-key"));
    assert!(!raw.contains("proxy-authorization"));
    assert!(raw.contains("\r\nx-custom: kept\r\n"));
    assert!(raw.ends_with(r#"{"inputs":"i love this"}"#));

    shutdown.trigger();
}

#[tokio::test]
async fn test_encoded_reply_keeps_content_encoding() {
    const GZIP_BYTES: &[u8] = &[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];
    let upstream = MockUpstream::start_with(MockReply {
        headers: &[("Content-Encoding", "gzip")],
        body: GZIP_BYTES,
        ..MockReply::new(200, Some("application/json"), "")
    })
    .await;
    let config = config(upstream.url("/v1/classify"));
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let response = client()
        .get(format!("http://{}/api/proxy?api=echo", addr))
        .header("Accept-Encoding", "gzip, deflate, br")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "gzip");
    assert_eq!(response.bytes().await.unwrap().as_ref(), GZIP_BYTES);

    let raw = upstream.requests()[0].to_ascii_lowercase();
    assert!(!raw.contains("accept-encoding"), "{}", raw);

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_disconnect_cancels_upstream_call() {
    let upstream =
        MockUpstream::start_with_delay(200, Some("application/json"), "{}", Duration::from_secs(10)).await;
    let mut config = config(upstream.url("/slow"));
    config.timeouts.upstream_secs = 30;
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let result = impatient
        .get(format!("http://{}/api/proxy?api=echo", addr))
        .send()
        .await;
    assert!(result.is_err());

    // The proxy drops its upstream connection with the client's request,
    // long before either the reply delay or the upstream deadline.
    let start = Instant::now();
    while upstream.disconnects() == 0 && start.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(upstream.requests().len(), 1);
    assert_eq!(upstream.disconnects(), 1);
    assert!(start.elapsed() < Duration::from_secs(5));

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_error_status_passthrough() {
    let upstream = MockUpstream::start(503, Some("application/json"), r#"{"retry":true}"#).await;
    let config = config(upstream.url("/v1/classify"));
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let response = client()
        .get(format!("http://{}/api/proxy?api=echo", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.text().await.unwrap(), r#"{"retry":true}"#);

    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_content_type_uses_default() {
    let upstream = MockUpstream::start(200, None, "plain words").await;
    let config = config(upstream.url("/"));
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let response = client()
        .get(format!("http://{}/api/proxy?api=echo", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.text().await.unwrap(), "plain words");

    shutdown.trigger();
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let upstream =
        MockUpstream::start_with_delay(200, Some("application/json"), "{}", Duration::from_secs(5)).await;
    let mut config = config(upstream.url("/slow"));
    config.timeouts.upstream_secs = 1;
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let start = Instant::now();
    let response = client()
        .get(format!("http://{}/api/proxy?api=echo", addr))
        .send()
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(4));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Proxy failed");
    assert!(body["details"].as_str().unwrap().contains("timed out"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_hides_secrets() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let config = config(format!("http://127.0.0.1:{}/v1/classify", port));
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let response = client()
        .get(format!("http://{}/api/proxy?api=echo", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let text = response.text().await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"], "Proxy failed");
    assert!(body["details"].is_string());
    assert!(!text.contains(FS_SECRET), "{}", text);
    assert!(!text.contains(HF_SECRET), "{}", text);

    shutdown.trigger();
}

#[tokio::test]
async fn test_peer_address_rate_limit() {
    let upstream = MockUpstream::start(200, Some("application/json"), "{}").await;
    let mut config = config(upstream.url("/"));
    config.rate_limit.max_requests = 2;
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let client = client();
    let url = format!("http://{}/api/proxy?api=echo", addr);
    for _ in 0..2 {
        assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);
    }
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"error":"Too many requests, please slow down."}"#
    );
    assert_eq!(upstream.requests().len(), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let upstream = MockUpstream::start(200, Some("application/json"), "{}").await;
    let config = config(upstream.url("/"));
    let (addr, shutdown) = common::spawn_proxy(config.clone(), forwarder(&config)).await;

    let health = format!("http://{}/healthz", addr);
    assert_eq!(client().get(&health).send().await.unwrap().status(), StatusCode::OK);

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(client().get(&health).send().await.is_err());
}
