// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-node passthrough: arbitrary JSON calls and binary exports.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ApiError, GatewayError};
use crate::forward::{ForwardRequest, Payload, Timeout};
use crate::registry::parse_node_id;
use crate::state::GatewayState;

/// Map a wildcard tail onto the node's `/api` tree. Rejects `..` segments.
fn upstream_path(tail: &str) -> Result<String, ApiError> {
    let tail = tail.trim_start_matches('/');
    if tail.split('/').any(|seg| seg == "..") {
        return Err(ApiError::new(GatewayError::BadRequest, "invalid path"));
    }
    Ok(format!("/api/{tail}"))
}

fn decode_request_body(body: &[u8]) -> Result<Option<serde_json::Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::new(GatewayError::BadRequest, format!("invalid JSON body: {e}")))
}

/// `ANY /api/properties/{id}/proxy/{*path}`
pub async fn proxy(
    State(s): State<Arc<GatewayState>>,
    Path((raw_id, tail)): Path<(String, String)>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let id = match parse_node_id(&raw_id) {
        Ok(id) => id,
        Err(code) => return code.to_default_response().into_response(),
    };
    if !matches!(method, Method::GET | Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
    {
        return ApiError::new(GatewayError::BadRequest, format!("unsupported method {method}"))
            .into_response();
    }
    let path = match upstream_path(&tail) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };
    let body = match decode_request_body(&body) {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    let mut req = ForwardRequest::new(method, path).query(query);
    if let Some(body) = body {
        req = req.json(body);
    }

    let forwarder = &s.forwarder;
    let outcome = s
        .aggregator
        .single(&s.registry, id, |node| async move { forwarder.forward(&node, req).await })
        .await;

    match outcome {
        Ok((_, Ok(forwarded))) => {
            let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::OK);
            match forwarded.payload {
                // 204 carries no body.
                Payload::Json(_) if status == StatusCode::NO_CONTENT => status.into_response(),
                Payload::Json(value) => (status, Json(value)).into_response(),
                Payload::Stream(stream) => stream.into_response(),
            }
        }
        Ok((_, Err(e))) => e.into_response(),
        Err(code) => code.to_default_response().into_response(),
    }
}

/// `GET /api/properties/{id}/export/{*path}`: the node's file, streamed.
pub async fn export(
    State(s): State<Arc<GatewayState>>,
    Path((raw_id, tail)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let id = match parse_node_id(&raw_id) {
        Ok(id) => id,
        Err(code) => return code.to_default_response().into_response(),
    };
    let path = match upstream_path(&tail) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let req = ForwardRequest::get(path).query(query).timeout(Timeout::Bulk).binary_stream();
    let forwarder = &s.forwarder;
    let outcome = s
        .aggregator
        .single(&s.registry, id, |node| async move { forwarder.forward(&node, req).await })
        .await;

    match outcome {
        Ok((_, Ok(forwarded))) => match forwarded.payload {
            Payload::Stream(stream) => stream.into_response(),
            Payload::Json(value) => Json(value).into_response(),
        },
        Ok((_, Err(e))) => e.into_response(),
        Err(code) => code.to_default_response().into_response(),
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
