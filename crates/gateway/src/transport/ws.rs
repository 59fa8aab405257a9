// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket bridge between a dashboard client and the broadcast hub.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::{ApiError, GatewayError};
use crate::hub::protocol::{handle_client_message, ServerMessage};
use crate::hub::Topic;
use crate::state::GatewayState;
use crate::transport::auth;

/// Query parameters for the WS upgrade.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubWsQuery {
    pub token: Option<String>,
    /// Comma-separated topics to join immediately (e.g. `global_summary`).
    #[serde(default)]
    pub subscribe: Option<String>,
}

/// `GET /ws`: WebSocket upgrade into the hub protocol.
pub async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<HubWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let expected = state.config.auth_token.as_deref();
    if let Err(code) = auth::validate_ws_token(query.token.as_deref(), expected) {
        return code.to_default_response().into_response();
    }

    let mut initial = Vec::new();
    for name in query.subscribe.as_deref().unwrap_or_default().split(',').map(str::trim) {
        if name.is_empty() {
            continue;
        }
        match name.parse::<Topic>() {
            Ok(topic) => initial.push(topic),
            Err(e) => {
                return ApiError::new(GatewayError::BadRequest, e).into_response();
            }
        }
    }

    ws.on_upgrade(move |socket| handle_ws(socket, state, initial)).into_response()
}

async fn send_reply(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    reply: &ServerMessage,
) -> bool {
    match serde_json::to_string(reply) {
        Ok(json) => ws_tx.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => true,
    }
}

/// Per-connection loop: hub pushes out, client commands in.
async fn handle_ws(socket: WebSocket, state: Arc<GatewayState>, initial: Vec<Topic>) {
    let mut conn = state.hub.connect();
    for topic in initial {
        conn.subscribe(topic);
    }
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            delivery = conn.recv() => {
                let Some((_, text)) = delivery else { break };
                if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&mut conn, text.as_str());
                        if !send_reply(&mut ws_tx, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    conn.disconnect();
    let _ = ws_tx.close().await;
}
