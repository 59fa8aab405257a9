// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::protocol::{handle_client_message, ServerMessage};
use super::{spawn_broadcast_loop, ConnectionState, Topic};
use crate::test_support::{node, summary_router, test_state, unreachable_url, MockNode};

const WAIT: Duration = Duration::from_secs(3);

#[yare::parameterized(
    global = { "global_summary", Some(Topic::GlobalSummary) },
    realtime = { "realtime_dashboard", Some(Topic::RealtimeDashboard) },
    unknown = { "weather", None },
    wrong_case = { "GLOBAL_SUMMARY", None },
)]
fn topic_parse(raw: &str, expected: Option<Topic>) {
    assert_eq!(raw.parse::<Topic>().ok(), expected);
}

#[tokio::test]
async fn tick_without_subscribers_skips_every_topic() -> anyhow::Result<()> {
    let mock = MockNode::start(summary_router(1)).await?;
    let (state, _) = test_state(vec![mock.node(1, "Alpha")]);

    let report = state.hub.tick().await;
    assert!(report.published.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped, Topic::ALL.to_vec());
    assert!(mock.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn subscriber_receives_complete_payload() -> anyhow::Result<()> {
    let alpha = MockNode::start(summary_router(5)).await?;
    let beta = node(2, "Beta", &unreachable_url().await?);
    let (state, _) = test_state(vec![beta, alpha.node(1, "Alpha")]);

    let mut conn = state.hub.connect();
    assert!(conn.subscribe(Topic::GlobalSummary));

    let report = state.hub.tick().await;
    assert_eq!(report.published, vec![(Topic::GlobalSummary, 1)]);
    assert_eq!(report.skipped, vec![Topic::RealtimeDashboard]);

    let received = tokio::time::timeout(WAIT, conn.recv()).await?;
    let Some((topic, text)) = received else {
        anyhow::bail!("connection closed before a payload arrived");
    };
    assert_eq!(topic, Topic::GlobalSummary);

    let payload: Value = serde_json::from_str(&text)?;
    assert_eq!(payload["event"], "global_summary");
    assert!(payload["ts"].as_u64().is_some_and(|ts| ts > 0));
    let nodes = payload["nodes"].as_array().cloned().unwrap_or_default();
    assert_eq!(nodes.len(), 2);
    assert_eq!(
        nodes[0],
        json!({"node": "Alpha", "ok": true, "summary": {"summary": {"calls": 5}}})
    );
    assert_eq!(nodes[1]["node"], "Beta");
    assert_eq!(nodes[1]["ok"], false);
    assert!(nodes[1]["error"].as_str().is_some_and(|e| !e.is_empty()));

    assert_eq!(alpha.requests()[0].path, "/api/dashboard/summary");
    Ok(())
}

#[tokio::test]
async fn topics_are_delivered_independently() -> anyhow::Result<()> {
    let mock = MockNode::start(summary_router(2)).await?;
    let (state, _) = test_state(vec![mock.node(1, "Alpha")]);

    let mut global = state.hub.connect();
    let mut realtime = state.hub.connect();
    global.subscribe(Topic::GlobalSummary);
    realtime.subscribe(Topic::RealtimeDashboard);

    let report = state.hub.tick().await;
    assert_eq!(report.published.len(), 2);

    let got = tokio::time::timeout(WAIT, realtime.recv()).await?;
    assert_eq!(got.map(|(topic, _)| topic), Some(Topic::RealtimeDashboard));
    let got = tokio::time::timeout(WAIT, global.recv()).await?;
    assert_eq!(got.map(|(topic, _)| topic), Some(Topic::GlobalSummary));

    // Nothing else is queued for either client.
    assert!(tokio::time::timeout(Duration::from_millis(50), global.recv()).await.is_err());
    assert!(tokio::time::timeout(Duration::from_millis(50), realtime.recv()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn unsubscribed_topic_is_skipped() -> anyhow::Result<()> {
    let mock = MockNode::start(summary_router(1)).await?;
    let (state, _) = test_state(vec![mock.node(1, "Alpha")]);

    let mut conn = state.hub.connect();
    conn.subscribe(Topic::GlobalSummary);
    assert_eq!(state.hub.subscriber_count(Topic::GlobalSummary), 1);
    assert!(conn.unsubscribe(Topic::GlobalSummary));
    assert!(!conn.unsubscribe(Topic::GlobalSummary));
    assert_eq!(state.hub.subscriber_count(Topic::GlobalSummary), 0);

    let report = state.hub.tick().await;
    assert!(report.published.is_empty());
    assert!(mock.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn registry_failure_fails_the_topic_not_the_tick() -> anyhow::Result<()> {
    let (state, store) = test_state(vec![]);
    let mut conn = state.hub.connect();
    conn.subscribe(Topic::GlobalSummary);
    store.set_unavailable(true);

    let report = state.hub.tick().await;
    assert_eq!(report.failed, vec![Topic::GlobalSummary]);
    assert_eq!(report.skipped, vec![Topic::RealtimeDashboard]);
    assert!(tokio::time::timeout(Duration::from_millis(50), conn.recv()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn connection_lifecycle() -> anyhow::Result<()> {
    let (state, _) = test_state(vec![]);
    let hub = &state.hub;

    let mut conn = hub.connect();
    assert_eq!(hub.connection_count(), 1);
    assert_eq!(conn.state(), ConnectionState::Connected);

    assert!(conn.subscribe(Topic::RealtimeDashboard));
    assert!(conn.subscribe(Topic::GlobalSummary));
    assert!(!conn.subscribe(Topic::GlobalSummary));
    assert_eq!(conn.state(), ConnectionState::Subscribed);
    assert_eq!(conn.topics(), vec![Topic::GlobalSummary, Topic::RealtimeDashboard]);

    conn.unsubscribe(Topic::GlobalSummary);
    conn.unsubscribe(Topic::RealtimeDashboard);
    assert_eq!(conn.state(), ConnectionState::Connected);

    conn.subscribe(Topic::GlobalSummary);
    conn.disconnect();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(hub.subscriber_count(Topic::GlobalSummary), 0);
    assert_eq!(hub.connection_count(), 0);
    assert!(!conn.subscribe(Topic::GlobalSummary));
    assert_eq!(conn.recv().await, None);

    // Dropping after an explicit disconnect does not release twice.
    let other = hub.connect();
    drop(conn);
    assert_eq!(hub.connection_count(), 1);
    drop(other);
    assert_eq!(hub.connection_count(), 0);
    Ok(())
}

#[tokio::test]
async fn client_messages_drive_subscriptions() -> anyhow::Result<()> {
    let (state, _) = test_state(vec![]);
    let mut conn = state.hub.connect();

    let reply =
        handle_client_message(&mut conn, r#"{"event":"subscribe","topic":"realtime_dashboard"}"#);
    assert_eq!(reply, ServerMessage::Subscribed { topic: Topic::RealtimeDashboard });

    let reply = handle_client_message(&mut conn, r#"{"event":"subscribe_global_summary"}"#);
    assert_eq!(reply, ServerMessage::Subscribed { topic: Topic::GlobalSummary });
    assert_eq!(conn.topics(), vec![Topic::GlobalSummary, Topic::RealtimeDashboard]);

    let reply =
        handle_client_message(&mut conn, r#"{"event":"unsubscribe","topic":"global_summary"}"#);
    assert_eq!(reply, ServerMessage::Unsubscribed { topic: Topic::GlobalSummary });

    assert_eq!(handle_client_message(&mut conn, r#"{"event":"ping"}"#), ServerMessage::Pong);

    let reply = handle_client_message(&mut conn, r#"{"event":"subscribe","topic":"weather"}"#);
    assert_eq!(reply, ServerMessage::Error { message: "unknown topic: weather".to_owned() });

    let reply = handle_client_message(&mut conn, "not json");
    assert!(matches!(reply, ServerMessage::Error { .. }));
    assert_eq!(conn.topics(), vec![Topic::RealtimeDashboard]);

    let encoded = serde_json::to_value(ServerMessage::Subscribed { topic: Topic::GlobalSummary })?;
    assert_eq!(encoded, json!({"event": "subscribed", "topic": "global_summary"}));
    Ok(())
}

#[tokio::test]
async fn broadcast_loop_publishes_until_cancelled() -> anyhow::Result<()> {
    let mock = MockNode::start(summary_router(9)).await?;
    let (state, _) = test_state(vec![mock.node(1, "Alpha")]);
    let mut conn = state.hub.connect();
    conn.subscribe(Topic::GlobalSummary);

    let shutdown = CancellationToken::new();
    let handle =
        spawn_broadcast_loop(state.hub.clone(), Duration::from_millis(20), shutdown.clone());

    let first = tokio::time::timeout(WAIT, conn.recv()).await?;
    assert_eq!(first.map(|(topic, _)| topic), Some(Topic::GlobalSummary));

    shutdown.cancel();
    tokio::time::timeout(WAIT, handle).await??;
    Ok(())
}
