// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `pbxgate` binary as a subprocess against a temp node file
//! and exercises it over HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use pbxgate::registry::Node;

/// Install the ring crypto provider for reqwest/rustls.
pub fn ensure_crypto() {
    pbxgate::ensure_crypto();
}

/// Resolve the path to the compiled `pbxgate` binary.
pub fn gateway_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("pbxgate")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `pbxgate` process that is killed on drop.
pub struct GatewayProcess {
    child: Child,
    port: u16,
    nodes_file: PathBuf,
    _state_dir: tempfile::TempDir,
}

/// Builder for a [`GatewayProcess`].
#[derive(Default)]
pub struct GatewayBuilder {
    nodes: Option<Vec<Node>>,
    auth_token: Option<String>,
    broadcast_ms: Option<u64>,
    env: Vec<(String, String)>,
    extra_args: Vec<String>,
}

impl GatewayBuilder {
    /// Write `nodes` to the node file before starting.
    pub fn nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    /// Require a bearer token (`--auth-token`).
    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    /// Broadcast interval (`--broadcast-ms`).
    pub fn broadcast_ms(mut self, ms: u64) -> Self {
        self.broadcast_ms = Some(ms);
        self
    }

    /// Extra environment variable for the child process.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Extra command-line argument.
    pub fn arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_owned());
        self
    }

    pub fn spawn(self) -> anyhow::Result<GatewayProcess> {
        ensure_crypto();
        let binary = gateway_binary();
        anyhow::ensure!(binary.exists(), "pbxgate binary not found at {}", binary.display());

        let port = free_port()?;
        let state_dir = tempfile::tempdir()?;
        let nodes_file = state_dir.path().join("nodes.json");
        if let Some(nodes) = self.nodes {
            let json = serde_json::to_string_pretty(&serde_json::json!({ "nodes": nodes }))?;
            std::fs::write(&nodes_file, json)?;
        }

        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--nodes-file".into(),
            nodes_file.to_string_lossy().into_owned(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
            "--metadata-timeout-ms".into(),
            "3000".into(),
            "--summary-timeout-ms".into(),
            "3000".into(),
        ];
        if let Some(ref token) = self.auth_token {
            args.extend(["--auth-token".into(), token.clone()]);
        }
        if let Some(ms) = self.broadcast_ms {
            args.extend(["--broadcast-ms".into(), ms.to_string()]);
        }
        args.extend(self.extra_args);

        let mut cmd = Command::new(&binary);
        cmd.args(&args)
            .env("PBXGATE_STATE_DIR", state_dir.path())
            .env_remove("PBXGATE_AUTH_TOKEN")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        let child = cmd.spawn()?;

        Ok(GatewayProcess { child, port, nodes_file, _state_dir: state_dir })
    }
}

impl GatewayProcess {
    pub fn build() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Spawn the gateway over `nodes` with default settings.
    pub fn start(nodes: Vec<Node>) -> anyhow::Result<Self> {
        Self::build().nodes(nodes).spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn nodes_file(&self) -> &Path {
        &self.nodes_file
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL of the hub.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Poll `/api/health` until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/api/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("pbxgate did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("pbxgate did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for GatewayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
