//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use axum::Router;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use token_proxy::config::{resolve_targets, ProxyConfig};
use token_proxy::http::server::build_router;
use token_proxy::http::{AppState, ForwardError, Forwarder, HttpServer, OutboundRequest, ProxyResponse};
use token_proxy::lifecycle::Shutdown;
use token_proxy::routing::TargetResolver;

pub const HF_SECRET: &str = "hf-test-secret";
pub const FS_SECRET: &str = "fs-test-secret";

/// Environment lookup used in place of the process environment.
pub fn secrets(var: &str) -> Option<String> {
    match var {
        "HF_TOKEN" => Some(HF_SECRET.to_string()),
        "FS_TOKEN" => Some(FS_SECRET.to_string()),
        _ => None,
    }
}

/// Forwarder that records what it was asked to send and answers with a canned reply.
pub struct StubForwarder {
    calls: AtomicUsize,
    last: Mutex<Option<OutboundRequest>>,
    reply: Result<ProxyResponse, String>,
}

impl StubForwarder {
    pub fn ok() -> Arc<Self> {
        Self::respond(200, "application/json", r#"{"ok":true}"#)
    }

    pub fn respond(status: u16, content_type: &'static str, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            reply: Ok(ProxyResponse {
                status: StatusCode::from_u16(status).unwrap(),
                content_type: HeaderValue::from_static(content_type),
                content_encoding: None,
                body: Bytes::from_static(body.as_bytes()),
            }),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
            reply: Err(message.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<OutboundRequest> {
        self.last.lock().unwrap().clone()
    }
}

impl Forwarder for StubForwarder {
    fn forward(&self, request: OutboundRequest) -> BoxFuture<'_, Result<ProxyResponse, ForwardError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request);
        let reply = self.reply.clone().map_err(ForwardError::Unreachable);
        Box::pin(async move { reply })
    }
}

/// Build app state for `config` with test secrets.
pub fn state(config: &ProxyConfig, forwarder: Arc<dyn Forwarder>) -> AppState {
    let table = resolve_targets(&config.targets, secrets).unwrap();
    AppState::new(config, TargetResolver::new(table), forwarder).unwrap()
}

/// Router for in-process `oneshot` tests.
pub fn app(config: &ProxyConfig, forwarder: Arc<dyn Forwarder>) -> Router {
    build_router(config, state(config, forwarder))
}

/// Run a full server on an ephemeral port.
pub async fn spawn_proxy(config: ProxyConfig, forwarder: Arc<dyn Forwarder>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let state = state(&config, forwarder);
    let server = HttpServer::new(config, state);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// What a [`MockUpstream`] answers with.
#[derive(Debug, Clone, Copy)]
pub struct MockReply {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub headers: &'static [(&'static str, &'static str)],
    pub body: &'static [u8],
    pub delay: Duration,
}

impl MockReply {
    pub fn new(status: u16, content_type: Option<&'static str>, body: &'static str) -> Self {
        Self {
            status,
            content_type,
            headers: &[],
            body: body.as_bytes(),
            delay: Duration::ZERO,
        }
    }
}

/// A raw TCP upstream that records each request and answers with a fixed reply.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub async fn start(status: u16, content_type: Option<&'static str>, body: &'static str) -> Self {
        Self::start_with(MockReply::new(status, content_type, body)).await
    }

    pub async fn start_with_delay(
        status: u16,
        content_type: Option<&'static str>,
        body: &'static str,
        delay: Duration,
    ) -> Self {
        Self::start_with(MockReply {
            delay,
            ..MockReply::new(status, content_type, body)
        })
        .await
    }

    pub async fn start_with(reply: MockReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(AtomicUsize::new(0));

        let captured = requests.clone();
        let closed = disconnects.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let captured = captured.clone();
                let closed = closed.clone();
                tokio::spawn(async move {
                    serve_one(socket, captured, closed, reply).await;
                });
            }
        });

        Self {
            addr,
            requests,
            disconnects,
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    /// Raw text of every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Connections the proxy closed while the reply was still delayed.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

async fn serve_one(
    mut socket: TcpStream,
    captured: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
    reply: MockReply,
) {
    let request = read_request(&mut socket).await;
    captured.lock().unwrap().push(request);

    if !reply.delay.is_zero() {
        let mut scratch = [0u8; 64];
        let peer_closed = tokio::select! {
            _ = tokio::time::sleep(reply.delay) => false,
            read = socket.read(&mut scratch) => matches!(read, Ok(0) | Err(_)),
        };
        if peer_closed {
            disconnects.fetch_add(1, Ordering::SeqCst);
            return;
        }
    }

    let status_text = match reply.status {
        200 => "200 OK",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let mut head = format!("HTTP/1.1 {}\r\n", status_text);
    if let Some(content_type) = reply.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", content_type));
    }
    for (name, value) in reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        reply.body.len()
    ));

    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(reply.body).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}
