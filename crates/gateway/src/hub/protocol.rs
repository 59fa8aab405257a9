// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client message protocol for the hub WebSocket.

use serde::{Deserialize, Serialize};

use super::{Connection, Topic};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    /// Shorthand kept for older dashboards.
    SubscribeGlobalSummary,
    Ping,
}

/// Replies to client messages. Pushed payloads are sent separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Pong,
    Error { message: String },
}

/// Apply one client text frame to the connection and produce the reply.
pub fn handle_client_message(conn: &mut Connection, text: &str) -> ServerMessage {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => return ServerMessage::Error { message: format!("invalid message: {e}") },
    };

    match msg {
        ClientMessage::Subscribe { topic } => match topic.parse::<Topic>() {
            Ok(topic) => {
                conn.subscribe(topic);
                ServerMessage::Subscribed { topic }
            }
            Err(message) => ServerMessage::Error { message },
        },
        ClientMessage::SubscribeGlobalSummary => {
            conn.subscribe(Topic::GlobalSummary);
            ServerMessage::Subscribed { topic: Topic::GlobalSummary }
        }
        ClientMessage::Unsubscribe { topic } => match topic.parse::<Topic>() {
            Ok(topic) => {
                conn.unsubscribe(topic);
                ServerMessage::Unsubscribed { topic }
            }
            Err(message) => ServerMessage::Error { message },
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}
