// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::aggregate::Aggregator;
use crate::config::GatewayConfig;
use crate::forward::Forwarder;
use crate::hub::BroadcastHub;
use crate::registry::{NodeRegistry, NodeStore};

/// Shared gateway state, built once at startup and handed to every handler.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub registry: NodeRegistry,
    pub forwarder: Forwarder,
    pub aggregator: Aggregator,
    pub hub: Arc<BroadcastHub>,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn NodeStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = NodeRegistry::new(store);
        let forwarder = Forwarder::from_config(&config);
        let aggregator = Aggregator::new(config.fanout_limit);
        let hub = Arc::new(BroadcastHub::new(registry.clone(), forwarder.clone(), aggregator));
        Self { config, registry, forwarder, aggregator, hub, shutdown }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
