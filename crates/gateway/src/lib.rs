// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pbxgate: one management API over a fleet of PBX nodes.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod forward;
pub mod hub;
pub mod registry;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::{Arc, Once};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::GatewayConfig;
use crate::hub::spawn_broadcast_loop;
use crate::registry::{nodes_from_env, FileNodeStore, NodeRegistry};
use crate::state::GatewayState;
use crate::transport::build_router;

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn ensure_crypto() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &GatewayConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Open the node file, seeding it from `PBX_<KEY>_URL`/`PBX_<KEY>_TOKEN` on first start.
async fn open_store(config: &GatewayConfig) -> anyhow::Result<Arc<FileNodeStore>> {
    let path = config.nodes_file();
    let store = Arc::new(FileNodeStore::new(&path));
    if !store.exists() {
        let seeded = nodes_from_env(std::env::vars());
        if !seeded.is_empty() {
            let count = NodeRegistry::new(store.clone())
                .reload(seeded)
                .await
                .map_err(|code| anyhow::anyhow!("seeding {}: {code}", path.display()))?;
            info!(path = %path.display(), count, "seeded node file from environment");
        }
    }
    Ok(store)
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = async {
                match sigterm {
                    Some(ref mut s) => s.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                match sigint {
                    Some(ref mut s) => s.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                info!("received SIGINT");
                shutdown.cancel();
            }
        }
    });
}

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    config.validate()?;
    ensure_crypto();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let store = open_store(&config).await?;
    let nodes_file = store.path().display().to_string();

    let state = Arc::new(GatewayState::new(config.clone(), store, shutdown.clone()));
    match state.registry.list_enabled_nodes().await {
        Ok(nodes) => info!(nodes_file, enabled = nodes.len(), "node registry loaded"),
        Err(code) => tracing::warn!(nodes_file, err = %code, "node registry not readable yet"),
    }

    let broadcaster =
        spawn_broadcast_loop(Arc::clone(&state.hub), config.broadcast_interval(), shutdown.clone());
    spawn_signal_handler(shutdown.clone());

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    info!("pbxgate listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    let _ = broadcaster.await;
    Ok(())
}
