// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic-based broadcast of aggregated node summaries.
//!
//! Each topic owns one `broadcast` channel created up front, so subscribing,
//! unsubscribing, and publishing never contend on a hub-level lock. A tick
//! aggregates over the enabled nodes for every topic that currently has
//! subscribers and publishes one complete payload per topic. Topics with no
//! subscribers are skipped for that tick.

pub mod connection;
pub mod protocol;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregateEntry, Aggregator};
use crate::error::GatewayError;
use crate::forward::{ForwardRequest, Forwarder, Timeout};
use crate::registry::NodeRegistry;
use crate::state::epoch_ms;

pub use connection::{Connection, ConnectionState};

/// A broadcast topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    GlobalSummary,
    RealtimeDashboard,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::GlobalSummary, Topic::RealtimeDashboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalSummary => "global_summary",
            Self::RealtimeDashboard => "realtime_dashboard",
        }
    }

    /// Node endpoint aggregated for this topic.
    pub fn upstream_path(&self) -> &'static str {
        match self {
            Self::GlobalSummary => "/api/dashboard/summary",
            Self::RealtimeDashboard => "/api/dashboard/realtime-dashboard",
        }
    }

    fn timeout(&self) -> Timeout {
        match self {
            Self::GlobalSummary => Timeout::Summary,
            Self::RealtimeDashboard => Timeout::Metadata,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or_else(|| format!("unknown topic: {s}"))
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One node's line in a pushed summary: `{node, ok, summary|error}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub node: String,
    pub result: Result<serde_json::Value, String>,
}

impl From<AggregateEntry> for SummaryEntry {
    fn from(entry: AggregateEntry) -> Self {
        Self { node: entry.pbx, result: entry.result }
    }
}

impl Serialize for SummaryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("node", &self.node)?;
        map.serialize_entry("ok", &self.result.is_ok())?;
        match self.result {
            Ok(ref summary) => map.serialize_entry("summary", summary)?,
            Err(ref error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

/// A full push for one topic. Built fresh every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastPayload {
    pub event: Topic,
    pub nodes: Vec<SummaryEntry>,
    /// Epoch millis when the payload was assembled.
    pub ts: u64,
}

/// Outcome of one [`BroadcastHub::tick`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Topics published, with the number of receivers reached.
    pub published: Vec<(Topic, usize)>,
    /// Topics with no subscribers.
    pub skipped: Vec<Topic>,
    /// Topics whose node list could not be resolved.
    pub failed: Vec<Topic>,
}

/// Subscription hub and periodic publisher.
pub struct BroadcastHub {
    registry: NodeRegistry,
    forwarder: Forwarder,
    aggregator: Aggregator,
    channels: HashMap<Topic, broadcast::Sender<Arc<str>>>,
    connections: AtomicUsize,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new(registry: NodeRegistry, forwarder: Forwarder, aggregator: Aggregator) -> Self {
        let channels = Topic::ALL
            .into_iter()
            .map(|topic| {
                let (tx, _) = broadcast::channel(16);
                (topic, tx)
            })
            .collect();
        Self {
            registry,
            forwarder,
            aggregator,
            channels,
            connections: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new client connection in the `Connected` state.
    pub fn connect(self: &Arc<Self>) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn = id, "hub client connected");
        Connection::new(id, Arc::clone(self))
    }

    pub(crate) fn release(&self, id: u64) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(conn = id, "hub client disconnected");
    }

    pub(crate) fn receiver(&self, topic: Topic) -> Option<broadcast::Receiver<Arc<str>>> {
        self.channels.get(&topic).map(broadcast::Sender::subscribe)
    }

    /// Live connections, subscribed or not.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels.get(&topic).map_or(0, broadcast::Sender::receiver_count)
    }

    /// Run one aggregation pass for `topic` over the enabled nodes.
    pub async fn collect(&self, topic: Topic) -> Result<BroadcastPayload, GatewayError> {
        let forwarder = &self.forwarder;
        let entries = self
            .aggregator
            .aggregate_enabled(&self.registry, |node| async move {
                let req = ForwardRequest::get(topic.upstream_path()).timeout(topic.timeout());
                forwarder.forward_json(&node, req).await
            })
            .await?;
        Ok(BroadcastPayload {
            event: topic,
            nodes: entries.into_iter().map(SummaryEntry::from).collect(),
            ts: epoch_ms(),
        })
    }

    /// Send a payload to every current subscriber of its topic.
    ///
    /// Returns the number of receivers reached.
    pub fn publish(&self, payload: &BroadcastPayload) -> usize {
        let Some(tx) = self.channels.get(&payload.event) else {
            return 0;
        };
        match serde_json::to_string(payload) {
            Ok(json) => tx.send(Arc::from(json)).unwrap_or(0),
            Err(e) => {
                tracing::warn!(topic = %payload.event, err = %e, "failed to encode payload");
                0
            }
        }
    }

    /// One broadcast pass across all topics.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for topic in Topic::ALL {
            if self.subscriber_count(topic) == 0 {
                report.skipped.push(topic);
                continue;
            }
            match self.collect(topic).await {
                Ok(payload) => {
                    let reached = self.publish(&payload);
                    tracing::debug!(%topic, nodes = payload.nodes.len(), reached, "published");
                    report.published.push((topic, reached));
                }
                Err(code) => {
                    tracing::warn!(%topic, err = %code, "broadcast pass failed");
                    report.failed.push(topic);
                }
            }
        }
        report
    }
}

/// Spawn the periodic broadcast task. It runs until `shutdown` is cancelled.
pub fn spawn_broadcast_loop(
    hub: Arc<BroadcastHub>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = hub.tick() => {}
            }
        }
        tracing::debug!("broadcast loop stopped");
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
