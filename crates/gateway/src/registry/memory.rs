// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{ensure_unique_ids, NewNode, Node, NodeStore};

/// In-process node store.
#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: RwLock<Vec<Node>>,
    unavailable: AtomicBool,
}

impl MemoryNodeStore {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes: RwLock::new(nodes), unavailable: AtomicBool::new(false) }
    }

    /// Simulate an unreachable backing store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            anyhow::bail!("node store unavailable");
        }
        Ok(())
    }
}

impl NodeStore for MemoryNodeStore {
    fn load_all(&self) -> anyhow::Result<Vec<Node>> {
        self.check()?;
        Ok(self.nodes.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn insert(&self, node: NewNode) -> anyhow::Result<Node> {
        self.check()?;
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let id = nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        let node = Node {
            id,
            name: node.name,
            base_url: node.base_url,
            token: node.token,
            enabled: true,
        };
        nodes.push(node.clone());
        Ok(node)
    }

    fn toggle(&self, id: i64) -> anyhow::Result<Option<Node>> {
        self.check()?;
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        Ok(nodes.iter_mut().find(|n| n.id == id).map(|node| {
            node.enabled = !node.enabled;
            node.clone()
        }))
    }

    fn replace(&self, nodes: Vec<Node>) -> anyhow::Result<()> {
        self.check()?;
        ensure_unique_ids(&nodes)?;
        *self.nodes.write().unwrap_or_else(PoisonError::into_inner) = nodes;
        Ok(())
    }
}
