// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request forwarding to a single PBX node.
//!
//! The forwarder never reshapes what a node sends back. A 2xx body is decoded
//! as-is; a non-2xx response keeps its status and raw body so the gateway can
//! pass it through untouched; transport failures collapse into
//! [`ForwardError::Unreachable`].

use std::fmt;
use std::time::Duration;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::{Client, Method};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::registry::Node;

/// Timeout class for a forwarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Ordinary resource reads and writes.
    #[default]
    Metadata,
    /// Large paginated reports such as call-detail records.
    Bulk,
    /// The global dashboard summary.
    Summary,
    /// Node connection probes.
    Probe,
}

/// Per-class timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub metadata: Duration,
    pub bulk: Duration,
    pub summary: Duration,
    pub probe: Duration,
}

impl Timeouts {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            metadata: config.metadata_timeout(),
            bulk: config.bulk_timeout(),
            summary: config.summary_timeout(),
            probe: config.probe_timeout(),
        }
    }

    /// The same timeout for every class.
    pub fn uniform(timeout: Duration) -> Self {
        Self { metadata: timeout, bulk: timeout, summary: timeout, probe: timeout }
    }

    pub fn get(&self, class: Timeout) -> Duration {
        match class {
            Timeout::Metadata => self.metadata,
            Timeout::Bulk => self.bulk,
            Timeout::Summary => self.summary,
            Timeout::Probe => self.probe,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            metadata: Duration::from_secs(15),
            bulk: Duration::from_secs(60),
            summary: Duration::from_secs(10),
            probe: Duration::from_secs(8),
        }
    }
}

/// How the response body should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Json,
    /// Piped through unaltered (file exports).
    BinaryStream,
}

/// One call to forward to a node.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Timeout,
    pub kind: ResponseKind,
}

impl ForwardRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: Timeout::default(),
            kind: ResponseKind::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary_stream(mut self) -> Self {
        self.kind = ResponseKind::BinaryStream;
        self
    }
}

/// A successful (2xx) node response.
#[derive(Debug)]
pub struct Forwarded {
    pub status: u16,
    pub payload: Payload,
}

#[derive(Debug)]
pub enum Payload {
    Json(serde_json::Value),
    Stream(StreamBody),
}

/// An undecoded node response body with its framing headers.
#[derive(Debug)]
pub struct StreamBody {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    response: reqwest::Response,
}

impl IntoResponse for StreamBody {
    fn into_response(self) -> Response {
        let mut builder = Response::builder().status(self.response.status().as_u16());
        if let Some(ref ct) = self.content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        if let Some(ref cd) = self.content_disposition {
            builder = builder.header(header::CONTENT_DISPOSITION, cd);
        }
        builder.body(Body::from_stream(self.response.bytes_stream())).unwrap_or_else(|e| {
            GatewayError::Internal.to_http_response(format!("stream error: {e}")).into_response()
        })
    }
}

/// A failed forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// The node answered with a non-2xx status. Status and body are kept verbatim.
    Rejected { status: u16, content_type: Option<String>, body: Bytes },
    /// Network, DNS, or timeout failure.
    Unreachable { message: String },
}

impl ForwardError {
    pub fn kind(&self) -> GatewayError {
        match self {
            Self::Rejected { .. } => GatewayError::UpstreamRejected,
            Self::Unreachable { .. } => GatewayError::Unreachable,
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Unreachable { .. } => None,
        }
    }

    /// The node's error body decoded as JSON (or as a string if it is not JSON).
    pub fn upstream_body(&self) -> Option<serde_json::Value> {
        match self {
            Self::Rejected { body, .. } => Some(decode_body(body)),
            Self::Unreachable { .. } => None,
        }
    }
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, body, .. } => match rejection_message(body) {
                Some(msg) => write!(f, "upstream responded with status {status}: {msg}"),
                None => write!(f, "upstream responded with status {status}"),
            },
            Self::Unreachable { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for ForwardError {}

impl IntoResponse for ForwardError {
    /// Rejections pass the node's status and body through unmodified.
    fn into_response(self) -> Response {
        match self {
            Self::Rejected { status, content_type, body } => {
                let mut builder = Response::builder().status(status);
                if let Some(ct) = content_type {
                    builder = builder.header(header::CONTENT_TYPE, ct);
                }
                builder.body(Body::from(body)).unwrap_or_else(|e| {
                    GatewayError::Internal
                        .to_http_response(format!("invalid upstream response: {e}"))
                        .into_response()
                })
            }
            Self::Unreachable { message } => {
                GatewayError::Unreachable.to_http_response(message).into_response()
            }
        }
    }
}

/// Join a node base URL and a request path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Decode a body as JSON; empty is `null`, non-JSON text becomes a string.
fn decode_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
    })
}

/// The `message` (or `error`) string of a JSON error body, if any.
fn rejection_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .into_iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str).map(str::to_owned))
}

fn header_string(resp: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    resp.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn describe(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("timeout of {}ms exceeded", timeout.as_millis())
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// Shared HTTP client for all node calls.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    timeouts: Timeouts,
}

impl Forwarder {
    pub fn new(timeouts: Timeouts, accept_invalid_certs: bool) -> Self {
        crate::ensure_crypto();
        let client = Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .unwrap_or_default();
        Self { client, timeouts }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(Timeouts::from_config(config), config.insecure_upstream_tls)
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Perform one authenticated call against `node`.
    pub async fn forward(
        &self,
        node: &Node,
        req: ForwardRequest,
    ) -> Result<Forwarded, ForwardError> {
        let timeout = self.timeouts.get(req.timeout);
        let raw_url = join_url(&node.base_url, &req.path);
        let mut url = reqwest::Url::parse(&raw_url).map_err(|e| ForwardError::Unreachable {
            message: format!("invalid node URL {raw_url}: {e}"),
        })?;
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                pairs.append_pair(k, v);
            }
        }

        let mut builder = self
            .client
            .request(req.method.clone(), url)
            .bearer_auth(&node.token)
            .timeout(timeout);
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            tracing::debug!(node_id = node.id, path = %req.path, err = %e, "forward failed");
            ForwardError::Unreachable { message: describe(&e, timeout) }
        })?;
        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let content_type = header_string(&resp, header::CONTENT_TYPE);
            let body = resp.bytes().await.map_err(|e| {
                tracing::debug!(
                    node_id = node.id,
                    path = %req.path,
                    status,
                    err = %e,
                    "rejection body unreadable"
                );
                ForwardError::Unreachable { message: describe(&e, timeout) }
            })?;
            tracing::debug!(node_id = node.id, path = %req.path, status, "upstream rejected");
            return Err(ForwardError::Rejected { status, content_type, body });
        }

        match req.kind {
            ResponseKind::BinaryStream => {
                let content_type = header_string(&resp, header::CONTENT_TYPE);
                let content_disposition = header_string(&resp, header::CONTENT_DISPOSITION);
                Ok(Forwarded {
                    status,
                    payload: Payload::Stream(StreamBody {
                        content_type,
                        content_disposition,
                        response: resp,
                    }),
                })
            }
            ResponseKind::Json => {
                let bytes = resp.bytes().await.map_err(|e| ForwardError::Unreachable {
                    message: describe(&e, timeout),
                })?;
                Ok(Forwarded { status, payload: Payload::Json(decode_body(&bytes)) })
            }
        }
    }

    /// Forward and return the decoded JSON body.
    pub async fn forward_json(
        &self,
        node: &Node,
        mut req: ForwardRequest,
    ) -> Result<serde_json::Value, ForwardError> {
        req.kind = ResponseKind::Json;
        match self.forward(node, req).await?.payload {
            Payload::Json(value) => Ok(value),
            Payload::Stream(_) => Ok(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
