// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node registry: resolves the configured PBX nodes.
//!
//! The registry never caches. Every call reads the backing [`NodeStore`], so
//! a node toggled or added out-of-band is visible to the next aggregation
//! pass without a restart. Callers that need a stable view for a whole pass
//! resolve the list once and hold on to the returned `Vec`.

pub mod file;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, GatewayError};

pub use file::FileNodeStore;
pub use memory::MemoryNodeStore;

/// A configured PBX node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    #[serde(alias = "api_token")]
    pub token: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Admin projection of a node (never exposes the credential).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            base_url: node.base_url.clone(),
            enabled: node.enabled,
        }
    }
}

/// A node to be added; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub name: String,
    pub base_url: String,
    pub token: String,
}

impl NewNode {
    /// Validate raw admin input. Blank fields are `Unprocessable`, a base URL
    /// that is not an absolute http(s) URL is `BadRequest`.
    pub fn parse(name: &str, base_url: &str, token: &str) -> Result<Self, ApiError> {
        let (name, base_url, token) = (name.trim(), base_url.trim(), token.trim());
        if name.is_empty() || base_url.is_empty() || token.is_empty() {
            return Err(ApiError::new(GatewayError::Unprocessable, "Missing fields"));
        }
        let url = reqwest::Url::parse(base_url).map_err(|e| {
            ApiError::new(GatewayError::BadRequest, format!("invalid base_url: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ApiError::new(
                GatewayError::BadRequest,
                format!("invalid base_url: {base_url} is not an absolute http(s) URL"),
            ));
        }
        Ok(Self { name: name.to_owned(), base_url: base_url.to_owned(), token: token.to_owned() })
    }
}

/// Durable backing store for node records.
pub trait NodeStore: Send + Sync {
    /// Every node, enabled or not, in store order.
    fn load_all(&self) -> anyhow::Result<Vec<Node>>;

    /// Persist a new, enabled node and return it with its assigned id.
    fn insert(&self, node: NewNode) -> anyhow::Result<Node>;

    /// Flip a node's `enabled` flag. Returns `None` if the id is unknown.
    fn toggle(&self, id: i64) -> anyhow::Result<Option<Node>>;

    /// Replace the whole node set. Fails if an id repeats.
    fn replace(&self, nodes: Vec<Node>) -> anyhow::Result<()>;
}

/// Resolves enabled nodes from a [`NodeStore`].
#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn NodeStore>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Duplicate ids mean a corrupt store.
    fn load(&self) -> Result<Vec<Node>, GatewayError> {
        let nodes = self.store.load_all().and_then(|nodes| {
            ensure_unique_ids(&nodes)?;
            Ok(nodes)
        });
        nodes.map_err(|e| {
            tracing::warn!(err = %e, "node registry unavailable");
            GatewayError::RegistryUnavailable
        })
    }

    /// Enabled nodes in resolution order (ascending id).
    pub async fn list_enabled_nodes(&self) -> Result<Vec<Node>, GatewayError> {
        let mut nodes: Vec<Node> = self.load()?.into_iter().filter(|n| n.enabled).collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    /// Look up one node within the enabled set. Disabled nodes never resolve.
    pub async fn find_node_by_id(&self, id: i64) -> Result<Option<Node>, GatewayError> {
        Ok(self.load()?.into_iter().find(|n| n.id == id && n.enabled))
    }

    /// Look up one node regardless of its enabled flag.
    pub async fn get_any(&self, id: i64) -> Result<Option<Node>, GatewayError> {
        Ok(self.load()?.into_iter().find(|n| n.id == id))
    }

    /// All nodes for administration, newest first.
    pub async fn list_all(&self) -> Result<Vec<NodeSummary>, GatewayError> {
        let mut nodes: Vec<NodeSummary> = self.load()?.iter().map(NodeSummary::from).collect();
        nodes.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(nodes)
    }

    pub async fn add_node(&self, node: NewNode) -> Result<Node, GatewayError> {
        let node = self.store.insert(node).map_err(|e| {
            tracing::warn!(err = %e, "failed to add node");
            GatewayError::RegistryUnavailable
        })?;
        tracing::info!(node_id = node.id, node = %node.name, "node added");
        Ok(node)
    }

    pub async fn toggle_node(&self, id: i64) -> Result<Option<Node>, GatewayError> {
        let toggled = self.store.toggle(id).map_err(|e| {
            tracing::warn!(node_id = id, err = %e, "failed to toggle node");
            GatewayError::RegistryUnavailable
        })?;
        if let Some(ref node) = toggled {
            tracing::info!(node_id = node.id, enabled = node.enabled, "node toggled");
        }
        Ok(toggled)
    }

    /// Replace the whole node set. Used to seed an empty registry at startup.
    pub async fn reload(&self, nodes: Vec<Node>) -> Result<usize, GatewayError> {
        let count = nodes.len();
        self.store.replace(nodes).map_err(|e| {
            tracing::warn!(err = %e, "node registry reload failed");
            GatewayError::RegistryUnavailable
        })?;
        tracing::info!(nodes = count, "node registry reloaded");
        Ok(count)
    }
}

/// Fail if any id appears more than once.
pub fn ensure_unique_ids(nodes: &[Node]) -> anyhow::Result<()> {
    let mut seen = BTreeSet::new();
    for node in nodes {
        if !seen.insert(node.id) {
            anyhow::bail!("duplicate node id {}", node.id);
        }
    }
    Ok(())
}

/// Parse a client-supplied node id. Runs before any registry or network access.
pub fn parse_node_id(raw: &str) -> Result<i64, GatewayError> {
    raw.trim().parse::<i64>().map_err(|_| GatewayError::InvalidIdentifier)
}

/// Build nodes from `PBX_<KEY>_URL` / `PBX_<KEY>_TOKEN` variable pairs.
///
/// Keys without a token are skipped. Ids are assigned from 1 in key order.
pub fn nodes_from_env<I>(vars: I) -> Vec<Node>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: BTreeMap<String, String> = vars.into_iter().collect();
    let mut nodes = Vec::new();
    for (key, url) in &vars {
        let Some(prefix) = key.strip_suffix("_URL") else { continue };
        if !prefix.starts_with("PBX_") || url.is_empty() {
            continue;
        }
        let Some(token) = vars.get(&format!("{prefix}_TOKEN")).filter(|t| !t.is_empty()) else {
            continue;
        };
        nodes.push(Node {
            id: nodes.len() as i64 + 1,
            name: prefix.replacen("PBX_", "PBX ", 1),
            base_url: url.clone(),
            token: token.clone(),
            enabled: true,
        });
    }
    nodes
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
