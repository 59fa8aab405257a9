// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client subscription state.

use std::sync::Arc;

use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};

use super::{BroadcastHub, Topic};

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake done, no topics joined.
    Connected,
    /// Joined at least one topic.
    Subscribed,
    /// Terminal.
    Disconnected,
}

/// One client's view of the hub.
///
/// Receivers are created at subscribe time, so a client only ever sees
/// payloads published after it joined. Dropping the connection disconnects it.
pub struct Connection {
    id: u64,
    hub: Arc<BroadcastHub>,
    streams: StreamMap<Topic, BroadcastStream<Arc<str>>>,
    disconnected: bool,
}

impl Connection {
    pub(super) fn new(id: u64, hub: Arc<BroadcastHub>) -> Self {
        Self { id, hub, streams: StreamMap::new(), disconnected: false }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        if self.disconnected {
            ConnectionState::Disconnected
        } else if self.streams.is_empty() {
            ConnectionState::Connected
        } else {
            ConnectionState::Subscribed
        }
    }

    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.streams.keys().copied().collect();
        topics.sort();
        topics
    }

    /// Join `topic`. Returns `false` if already subscribed or disconnected.
    pub fn subscribe(&mut self, topic: Topic) -> bool {
        if self.disconnected || self.streams.contains_key(&topic) {
            return false;
        }
        let Some(rx) = self.hub.receiver(topic) else {
            return false;
        };
        self.streams.insert(topic, BroadcastStream::new(rx));
        tracing::debug!(conn = self.id, %topic, "subscribed");
        true
    }

    /// Leave `topic` without closing the connection.
    pub fn unsubscribe(&mut self, topic: Topic) -> bool {
        let removed = self.streams.remove(&topic).is_some();
        if removed {
            tracing::debug!(conn = self.id, %topic, "unsubscribed");
        }
        removed
    }

    pub fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        self.streams.clear();
        self.hub.release(self.id);
    }

    /// Next published message on any joined topic.
    ///
    /// Pends while there are no subscriptions. Returns `None` once disconnected.
    pub async fn recv(&mut self) -> Option<(Topic, Arc<str>)> {
        loop {
            if self.disconnected {
                return None;
            }
            if self.streams.is_empty() {
                std::future::pending::<()>().await;
            }
            match self.streams.next().await {
                Some((topic, Ok(text))) => return Some((topic, text)),
                Some((topic, Err(BroadcastStreamRecvError::Lagged(n)))) => {
                    tracing::debug!(conn = self.id, %topic, lagged = n, "client lagged, skipping");
                }
                None => {}
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
