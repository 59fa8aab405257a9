// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-file node store with atomic writes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::{ensure_unique_ids, NewNode, Node, NodeStore};

/// On-disk layout of the node file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct NodeFile {
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Node store backed by a JSON file, re-read on every access.
///
/// A missing file is an empty registry. A file that exists but cannot be
/// read or parsed is an error, which the registry reports as unavailable.
pub struct FileNodeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileNodeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read(&self) -> anyhow::Result<NodeFile> {
        if !self.path.exists() {
            return Ok(NodeFile::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write via a sibling temp file + rename so readers never see a torn file.
    fn write(&self, file: &NodeFile) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(file)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl NodeStore for FileNodeStore {
    fn load_all(&self) -> anyhow::Result<Vec<Node>> {
        Ok(self.read()?.nodes)
    }

    fn insert(&self, node: NewNode) -> anyhow::Result<Node> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        let id = file.nodes.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        let node = Node {
            id,
            name: node.name,
            base_url: node.base_url,
            token: node.token,
            enabled: true,
        };
        file.nodes.push(node.clone());
        self.write(&file)?;
        Ok(node)
    }

    fn toggle(&self, id: i64) -> anyhow::Result<Option<Node>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        let Some(node) = file.nodes.iter_mut().find(|n| n.id == id) else {
            return Ok(None);
        };
        node.enabled = !node.enabled;
        let toggled = node.clone();
        self.write(&file)?;
        Ok(Some(toggled))
    }

    fn replace(&self, nodes: Vec<Node>) -> anyhow::Result<()> {
        ensure_unique_ids(&nodes)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&NodeFile { nodes })
    }
}
