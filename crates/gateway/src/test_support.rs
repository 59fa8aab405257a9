// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mock PBX nodes, node builders, and state helpers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::registry::{MemoryNodeStore, Node};
use crate::state::GatewayState;

/// Build an enabled node with a fixed token.
pub fn node(id: i64, name: &str, base_url: &str) -> Node {
    Node {
        id,
        name: name.to_owned(),
        base_url: base_url.to_owned(),
        token: format!("token-{id}"),
        enabled: true,
    }
}

/// Gateway config with short timeouts suitable for tests.
pub fn test_config() -> GatewayConfig {
    GatewayConfig::parse_from([
        "pbxgate",
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--broadcast-ms",
        "60000",
        "--metadata-timeout-ms",
        "2000",
        "--bulk-timeout-ms",
        "2000",
        "--summary-timeout-ms",
        "2000",
        "--probe-timeout-ms",
        "2000",
    ])
}

/// Gateway state over an in-memory registry.
pub fn test_state(nodes: Vec<Node>) -> (Arc<GatewayState>, Arc<MemoryNodeStore>) {
    test_state_with(test_config(), nodes)
}

pub fn test_state_with(
    config: GatewayConfig,
    nodes: Vec<Node>,
) -> (Arc<GatewayState>, Arc<MemoryNodeStore>) {
    let store = Arc::new(MemoryNodeStore::new(nodes));
    let state = GatewayState::new(config, store.clone(), CancellationToken::new());
    (Arc::new(state), store)
}

/// A request seen by a [`MockNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
}

type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

async fn record_request(State(log): State<RequestLog>, req: Request, next: Next) -> Response {
    let recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_owned(),
        query: req.uri().query().map(str::to_owned),
        authorization: req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    };
    log.lock().unwrap_or_else(PoisonError::into_inner).push(recorded);
    next.run(req).await
}

/// An in-process PBX node served on a loopback port. Stops on drop.
pub struct MockNode {
    pub addr: SocketAddr,
    log: RequestLog,
    shutdown: CancellationToken,
}

impl MockNode {
    pub async fn start(router: Router) -> anyhow::Result<Self> {
        let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
        let router = router.layer(middleware::from_fn_with_state(log.clone(), record_request));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await;
        });
        Ok(Self { addr, log, shutdown })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A registry node pointing at this mock.
    pub fn node(&self, id: i64, name: &str) -> Node {
        node(id, name, &self.url())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Node answering both dashboard endpoints with `{"summary":{"calls":N}}`.
pub fn summary_router(calls: u64) -> Router {
    let body = serde_json::json!({ "summary": { "calls": calls } });
    let realtime = body.clone();
    Router::new()
        .route("/api/dashboard/summary", get(move || async move { Json(body) }))
        .route("/api/dashboard/realtime-dashboard", get(move || async move { Json(realtime) }))
}

/// Node that sleeps `delay` before answering anything with `{}`.
pub fn slow_router(delay: Duration) -> Router {
    Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        Json(serde_json::json!({}))
    })
}

/// Node answering every request with `status` and a raw `body`.
pub fn fixed_router(status: u16, content_type: &'static str, body: &'static str) -> Router {
    Router::new().fallback(move || async move {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap_or_default()
    })
}

/// A loopback URL with nothing listening on it.
pub async fn unreachable_url() -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Serve the full gateway router on a loopback port until `shutdown` fires.
pub async fn serve_gateway(
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    let router = crate::transport::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
    });
    Ok(addr)
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}
