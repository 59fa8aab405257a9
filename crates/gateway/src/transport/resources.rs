// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregated read endpoints and their single-node variants.
//!
//! Every resource is a row in [`RESOURCES`]: the gateway route, the node
//! endpoint it maps to, which query keys are forwarded, the timeout class,
//! and how the node's body is reshaped before it lands in `data`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::aggregate::shape::list_or_empty;
use crate::aggregate::AggregateEntry;
use crate::forward::{ForwardRequest, Timeout};
use crate::registry::parse_node_id;
use crate::state::GatewayState;

/// How a node body becomes the entry's `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reshape {
    /// Body as-is.
    Raw,
    /// One top-level field of the body (`null` when absent).
    Field(&'static str),
    /// A list probed out of whatever envelope the node used.
    List(Option<&'static str>),
}

impl Reshape {
    pub fn apply(&self, body: Value) -> Value {
        match *self {
            Self::Raw => body,
            Self::Field(key) => body.get(key).cloned().unwrap_or(Value::Null),
            Self::List(key) => list_or_empty(&body, key),
        }
    }
}

/// One aggregated read endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Resource {
    pub route: &'static str,
    pub upstream: &'static str,
    pub query: &'static [&'static str],
    pub timeout: Timeout,
    pub reshape: Reshape,
}

impl Resource {
    fn request(&self, params: &HashMap<String, String>) -> ForwardRequest {
        let query = self
            .query
            .iter()
            .filter_map(|key| params.get(*key).map(|v| (key.to_string(), v.clone())));
        ForwardRequest::get(self.upstream).query(query).timeout(self.timeout)
    }
}

pub const RESOURCES: &[Resource] = &[
    Resource {
        route: "/api/dashboard/summary",
        upstream: "/api/dashboard/summary",
        query: &["date"],
        timeout: Timeout::Metadata,
        reshape: Reshape::Raw,
    },
    Resource {
        route: "/api/dashboard/call-chart",
        upstream: "/api/dashboard/call-chart",
        query: &["date"],
        timeout: Timeout::Metadata,
        reshape: Reshape::Raw,
    },
    Resource {
        route: "/api/realtime-dashboard",
        upstream: "/api/dashboard/realtime-dashboard",
        query: &[],
        timeout: Timeout::Metadata,
        reshape: Reshape::Raw,
    },
    Resource {
        route: "/api/system",
        upstream: "/api/dashboard/system/health",
        query: &[],
        timeout: Timeout::Metadata,
        reshape: Reshape::Raw,
    },
    Resource {
        route: "/api/cdrs",
        upstream: "/api/cdrs",
        query: &["page"],
        timeout: Timeout::Bulk,
        reshape: Reshape::Field("data"),
    },
    Resource {
        route: "/api/tenants",
        upstream: "/api/tenants",
        query: &[],
        timeout: Timeout::Metadata,
        reshape: Reshape::List(Some("tenants")),
    },
    Resource {
        route: "/api/dids",
        upstream: "/api/dids",
        query: &[],
        timeout: Timeout::Metadata,
        reshape: Reshape::List(Some("dids")),
    },
    Resource {
        route: "/api/trunks",
        upstream: "/api/trunks",
        query: &[],
        timeout: Timeout::Metadata,
        reshape: Reshape::List(Some("trunks")),
    },
    Resource {
        route: "/api/packages",
        upstream: "/api/packages",
        query: &[],
        timeout: Timeout::Metadata,
        reshape: Reshape::List(Some("packages")),
    },
];

/// Mount `route` and `route/property/{id}` for every resource.
pub fn routes() -> Router<Arc<GatewayState>> {
    RESOURCES.iter().fold(Router::new(), |router, res| {
        router
            .route(
                res.route,
                get(
                    move |State(s): State<Arc<GatewayState>>,
                          Query(params): Query<HashMap<String, String>>| {
                        aggregate_resource(s, res, params)
                    },
                ),
            )
            .route(
                &format!("{}/property/{{id}}", res.route),
                get(
                    move |State(s): State<Arc<GatewayState>>,
                          Path(id): Path<String>,
                          Query(params): Query<HashMap<String, String>>| {
                        single_resource(s, res, id, params)
                    },
                ),
            )
    })
}

/// `GET <route>`: one entry per enabled node, always HTTP 200.
async fn aggregate_resource(
    s: Arc<GatewayState>,
    res: &'static Resource,
    params: HashMap<String, String>,
) -> Response {
    let forwarder = &s.forwarder;
    let params = &params;
    let entries = s
        .aggregator
        .aggregate_enabled(&s.registry, |node| async move {
            forwarder.forward_json(&node, res.request(params)).await
        })
        .await;

    match entries {
        Ok(entries) => {
            let entries: Vec<AggregateEntry> =
                entries.into_iter().map(|e| e.map_data(|d| res.reshape.apply(d))).collect();
            Json(entries).into_response()
        }
        Err(code) => code.to_default_response().into_response(),
    }
}

/// `GET <route>/property/{id}`: the node's entry, or its error as-is.
async fn single_resource(
    s: Arc<GatewayState>,
    res: &'static Resource,
    raw_id: String,
    params: HashMap<String, String>,
) -> Response {
    let id = match parse_node_id(&raw_id) {
        Ok(id) => id,
        Err(code) => return code.to_default_response().into_response(),
    };

    let forwarder = &s.forwarder;
    let req = res.request(&params);
    let outcome = s
        .aggregator
        .single(&s.registry, id, |node| async move { forwarder.forward_json(&node, req).await })
        .await;

    match outcome {
        Ok((node, Ok(body))) => {
            Json(AggregateEntry::new(&node, Ok(res.reshape.apply(body)))).into_response()
        }
        Ok((_, Err(e))) => e.into_response(),
        Err(code) => code.to_default_response().into_response(),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
