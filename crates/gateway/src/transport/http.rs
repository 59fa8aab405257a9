// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for health, the global summary, and node administration.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, GatewayError};
use crate::forward::{ForwardRequest, Timeout};
use crate::hub::{SummaryEntry, Topic};
use crate::registry::{parse_node_id, NewNode, NodeSummary};
use crate::state::{epoch_ms, GatewayState};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub time: u64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct GlobalSummaryResponse {
    pub nodes: Vec<SummaryEntry>,
}

#[derive(Debug, Serialize)]
pub struct PropertyListResponse {
    pub data: Vec<NodeSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddPropertyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    pub ok: bool,
    pub property: NodeSummary,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub ok: bool,
    pub tenants: serde_json::Value,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse { ok: true, time: epoch_ms(), connections: s.hub.connection_count() })
}

/// `GET /api/global/summary`: the same payload the hub pushes, on demand.
pub async fn global_summary(State(s): State<Arc<GatewayState>>) -> Response {
    match s.hub.collect(Topic::GlobalSummary).await {
        Ok(payload) => Json(GlobalSummaryResponse { nodes: payload.nodes }).into_response(),
        Err(code) => code.to_default_response().into_response(),
    }
}

/// `GET /api/properties`: every node, newest first, without tokens.
pub async fn list_properties(State(s): State<Arc<GatewayState>>) -> Response {
    match s.registry.list_all().await {
        Ok(data) => Json(PropertyListResponse { data }).into_response(),
        Err(code) => code.to_default_response().into_response(),
    }
}

/// `POST /api/properties`
pub async fn add_property(
    State(s): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<PropertyResponse>, ApiError> {
    let req: AddPropertyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AddPropertyRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(GatewayError::BadRequest, format!("invalid JSON body: {e}"))
        })?
    };
    let new = NewNode::parse(
        req.name.as_deref().unwrap_or_default(),
        req.base_url.as_deref().unwrap_or_default(),
        req.api_token.as_deref().unwrap_or_default(),
    )?;
    let node = s.registry.add_node(new).await?;
    tracing::info!(node_id = node.id, node = %node.name, "property added");
    Ok(Json(PropertyResponse { ok: true, property: NodeSummary::from(&node) }))
}

/// `PATCH /api/properties/{id}/toggle`
pub async fn toggle_property(
    State(s): State<Arc<GatewayState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let id = parse_node_id(&raw_id)?;
    let node = s.registry.toggle_node(id).await?.ok_or(GatewayError::PropertyNotFound)?;
    tracing::info!(node_id = node.id, enabled = node.enabled, "property toggled");
    Ok(Json(PropertyResponse { ok: true, property: NodeSummary::from(&node) }))
}

/// `POST /api/properties/{id}/test`: probe the node's tenant list.
///
/// Disabled nodes can be probed so they can be checked before re-enabling.
pub async fn test_property(
    State(s): State<Arc<GatewayState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<ProbeResponse>, ApiError> {
    let id = parse_node_id(&raw_id)?;
    let node = s.registry.get_any(id).await?.ok_or(GatewayError::PropertyNotFound)?;
    let req = ForwardRequest::get("/api/tenants").timeout(Timeout::Probe);
    match s.forwarder.forward_json(&node, req).await {
        Ok(tenants) => Ok(Json(ProbeResponse { ok: true, tenants })),
        Err(e) => {
            tracing::info!(node_id = node.id, err = %e, "property probe failed");
            Err(ApiError::new(e.kind(), format!("PBX connection failed: {e}")))
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
