// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Management gateway for a fleet of PBX nodes.
#[derive(Debug, Clone, Parser)]
#[command(name = "pbxgate", version, about)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "PBXGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5050, env = "PBXGATE_PORT")]
    pub port: u16,

    /// Bearer token for client API auth. If unset, auth is disabled.
    #[arg(long, env = "PBXGATE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Path to the node registry JSON file.
    #[arg(long, env = "PBXGATE_NODES_FILE")]
    pub nodes_file: Option<PathBuf>,

    /// Broadcast interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "PBXGATE_BROADCAST_MS")]
    pub broadcast_ms: u64,

    /// Timeout for metadata calls to a node, in milliseconds.
    #[arg(long, default_value_t = 15000, env = "PBXGATE_METADATA_TIMEOUT_MS")]
    pub metadata_timeout_ms: u64,

    /// Timeout for bulk/report calls (call records), in milliseconds.
    #[arg(long, default_value_t = 60000, env = "PBXGATE_BULK_TIMEOUT_MS")]
    pub bulk_timeout_ms: u64,

    /// Timeout for the global summary fetch, in milliseconds.
    #[arg(long, default_value_t = 10000, env = "PBXGATE_SUMMARY_TIMEOUT_MS")]
    pub summary_timeout_ms: u64,

    /// Timeout for node connection probes, in milliseconds.
    #[arg(long, default_value_t = 8000, env = "PBXGATE_PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,

    /// Max concurrent node calls per aggregation pass. Defaults to the node count.
    #[arg(long, env = "PBXGATE_FANOUT_LIMIT")]
    pub fanout_limit: Option<usize>,

    /// Accept self-signed or otherwise invalid node TLS certificates.
    #[arg(long, env = "PBXGATE_INSECURE_UPSTREAM_TLS")]
    pub insecure_upstream_tls: bool,

    /// Log filter directive (e.g. `info`, `pbxgate=debug`).
    #[arg(long, default_value = "info", env = "PBXGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format: `text` or `json`.
    #[arg(long, default_value = "text", env = "PBXGATE_LOG_FORMAT")]
    pub log_format: String,
}

impl GatewayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let intervals = [
            ("--broadcast-ms", self.broadcast_ms),
            ("--metadata-timeout-ms", self.metadata_timeout_ms),
            ("--bulk-timeout-ms", self.bulk_timeout_ms),
            ("--summary-timeout-ms", self.summary_timeout_ms),
            ("--probe-timeout-ms", self.probe_timeout_ms),
        ];
        for (flag, value) in intervals {
            if value == 0 {
                anyhow::bail!("{flag} must be greater than zero");
            }
        }
        if self.fanout_limit == Some(0) {
            anyhow::bail!("--fanout-limit must be greater than zero");
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid log format: {other} (expected text or json)"),
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_millis(self.bulk_timeout_ms)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_millis(self.summary_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Path of the node registry file, falling back to the state directory.
    pub fn nodes_file(&self) -> PathBuf {
        match self.nodes_file {
            Some(ref path) => path.clone(),
            None => state_dir().join("nodes.json"),
        }
    }
}

/// Resolve the state directory for gateway data.
///
/// Checks `PBXGATE_STATE_DIR`, then `$XDG_STATE_HOME/pbxgate`,
/// then `$HOME/.local/state/pbxgate`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PBXGATE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("pbxgate");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/pbxgate");
    }
    PathBuf::from(".pbxgate")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
