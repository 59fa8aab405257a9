// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the gateway.

pub mod auth;
pub mod http;
pub mod proxy;
pub mod resources;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{any, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/health", get(http::health))
        .route("/api/global/summary", get(http::global_summary))
        // Aggregated reads and their single-node variants
        .merge(resources::routes())
        // Node administration
        .route("/api/properties", get(http::list_properties).post(http::add_property))
        .route("/api/properties/{id}/toggle", patch(http::toggle_property))
        .route("/api/properties/{id}/test", post(http::test_property))
        // Single-node passthrough
        .route("/api/properties/{id}/proxy/{*path}", any(proxy::proxy))
        .route("/api/properties/{id}/export/{*path}", get(proxy::export))
        // Hub
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
