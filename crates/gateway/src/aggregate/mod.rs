// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-node fan-out with per-node failure isolation.
//!
//! [`Aggregator::aggregate`] runs one operation against every node and turns
//! each outcome into an [`AggregateEntry`]. A failing node only ever affects
//! its own entry; the pass as a whole fails only when node resolution does.

pub mod shape;

use std::fmt::Display;
use std::future::Future;

use futures_util::StreamExt;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::GatewayError;
use crate::registry::{Node, NodeRegistry};

/// One node's outcome in an aggregation pass.
///
/// Serializes as `{pbx_id, pbx, ok, data}` or `{pbx_id, pbx, ok, error}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEntry {
    pub pbx_id: i64,
    pub pbx: String,
    pub result: Result<serde_json::Value, String>,
}

impl AggregateEntry {
    pub fn new(node: &Node, result: Result<serde_json::Value, String>) -> Self {
        Self { pbx_id: node.id, pbx: node.name.clone(), result }
    }

    pub fn ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }

    /// Apply `f` to the data of a successful entry.
    pub fn map_data(self, f: impl FnOnce(serde_json::Value) -> serde_json::Value) -> Self {
        Self { result: self.result.map(f), ..self }
    }
}

impl Serialize for AggregateEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("pbx_id", &self.pbx_id)?;
        map.serialize_entry("pbx", &self.pbx)?;
        map.serialize_entry("ok", &self.ok())?;
        match self.result {
            Ok(ref data) => map.serialize_entry("data", data)?,
            Err(ref error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

/// Ordered, bounded fan-out over nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    fanout_limit: Option<usize>,
}

impl Aggregator {
    /// `fanout_limit` caps in-flight node calls; `None` means one per node.
    pub fn new(fanout_limit: Option<usize>) -> Self {
        Self { fanout_limit }
    }

    /// Run `op` against every node and collect one entry per node, in input order.
    pub async fn aggregate<F, Fut, E>(&self, nodes: &[Node], op: F) -> Vec<AggregateEntry>
    where
        F: Fn(Node) -> Fut,
        Fut: Future<Output = Result<serde_json::Value, E>>,
        E: Display,
    {
        let limit = self.fanout_limit.unwrap_or(nodes.len()).max(1);
        let op = &op;
        futures_util::stream::iter(nodes.iter().cloned())
            .map(|node| async move {
                let result = op(node.clone()).await.map_err(|e| e.to_string());
                if let Err(ref e) = result {
                    tracing::debug!(node_id = node.id, node = %node.name, err = %e, "node failed");
                }
                AggregateEntry::new(&node, result)
            })
            .buffered(limit)
            .collect()
            .await
    }

    /// Resolve the enabled nodes once, then aggregate over them.
    pub async fn aggregate_enabled<F, Fut, E>(
        &self,
        registry: &NodeRegistry,
        op: F,
    ) -> Result<Vec<AggregateEntry>, GatewayError>
    where
        F: Fn(Node) -> Fut,
        Fut: Future<Output = Result<serde_json::Value, E>>,
        E: Display,
    {
        let nodes = registry.list_enabled_nodes().await?;
        Ok(self.aggregate(&nodes, op).await)
    }

    /// Single-node path: resolve `id` in the enabled set and run `op` on it.
    pub async fn single<F, Fut, T>(
        &self,
        registry: &NodeRegistry,
        id: i64,
        op: F,
    ) -> Result<(Node, T), GatewayError>
    where
        F: FnOnce(Node) -> Fut,
        Fut: Future<Output = T>,
    {
        let node = registry.find_node_by_id(id).await?.ok_or(GatewayError::PropertyNotFound)?;
        let out = op(node.clone()).await;
        Ok((node, out))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
