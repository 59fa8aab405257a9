// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `pbxgate` binary against mock
//! PBX nodes and exercise HTTP and WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use pbxgate::test_support::{fixed_router, node, summary_router, unreachable_url, MockNode};
use pbxgate_specs::GatewayProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start(vec![])?;
    gateway.wait_healthy(TIMEOUT).await?;

    let resp: Value =
        reqwest::get(format!("{}/api/health", gateway.base_url())).await?.json().await?;
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["connections"], 0);
    assert!(resp["time"].is_number());
    Ok(())
}

#[tokio::test]
async fn http_aggregate_and_single_node() -> anyhow::Result<()> {
    let mock =
        MockNode::start(fixed_router(200, "application/json", r#"{"data":{"data":[{"id":1}]}}"#))
            .await?;
    let down = node(2, "Down", &unreachable_url().await?);
    let gateway = GatewayProcess::start(vec![mock.node(1, "Up"), down])?;
    gateway.wait_healthy(TIMEOUT).await?;

    let resp: Value =
        reqwest::get(format!("{}/api/tenants", gateway.base_url())).await?.json().await?;
    assert_eq!(resp[0], json!({"pbx_id": 1, "pbx": "Up", "ok": true, "data": [{"id": 1}]}));
    assert_eq!(resp[1]["pbx_id"], 2);
    assert_eq!(resp[1]["ok"], false);

    let resp = reqwest::get(format!("{}/api/tenants/property/x", gateway.base_url())).await?;
    assert_eq!(resp.status().as_u16(), 400);
    let resp = reqwest::get(format!("{}/api/tenants/property/9", gateway.base_url())).await?;
    assert_eq!(resp.status().as_u16(), 404);
    let resp = reqwest::get(format!("{}/api/tenants/property/2", gateway.base_url())).await?;
    assert_eq!(resp.status().as_u16(), 502);
    Ok(())
}

#[tokio::test]
async fn http_requires_bearer_when_configured() -> anyhow::Result<()> {
    let gateway = GatewayProcess::build().nodes(vec![]).auth_token("s3cret").spawn()?;
    gateway.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let url = format!("{}/api/properties", gateway.base_url());
    assert_eq!(client.get(&url).send().await?.status().as_u16(), 401);
    let resp = client.get(&url).bearer_auth("s3cret").send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    Ok(())
}

#[tokio::test]
async fn env_seeds_missing_node_file() -> anyhow::Result<()> {
    let mock = MockNode::start(fixed_router(200, "application/json", "[]")).await?;
    let gateway = GatewayProcess::build()
        .env("PBX_MAIN_URL", &mock.url())
        .env("PBX_MAIN_TOKEN", "main-token")
        .spawn()?;
    gateway.wait_healthy(TIMEOUT).await?;

    let resp: Value =
        reqwest::get(format!("{}/api/properties", gateway.base_url())).await?.json().await?;
    assert_eq!(resp["data"][0]["name"], "PBX MAIN");
    assert!(gateway.nodes_file().exists());

    reqwest::get(format!("{}/api/dids", gateway.base_url())).await?;
    assert_eq!(mock.requests()[0].authorization.as_deref(), Some("Bearer main-token"));
    Ok(())
}

#[tokio::test]
async fn invalid_config_exits_nonzero() -> anyhow::Result<()> {
    let mut gateway = GatewayProcess::build().nodes(vec![]).broadcast_ms(0).spawn()?;
    let status = gateway.wait_exit(TIMEOUT).await?;
    assert!(!status.success());
    Ok(())
}

// -- WebSocket ----------------------------------------------------------------

#[tokio::test]
async fn ws_receives_periodic_global_summary() -> anyhow::Result<()> {
    let mock = MockNode::start(summary_router(3)).await?;
    let gateway =
        GatewayProcess::build().nodes(vec![mock.node(1, "Alpha")]).broadcast_ms(200).spawn()?;
    gateway.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await?;
    ws.send(Message::text(json!({"event": "subscribe_global_summary"}).to_string())).await?;

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    let mut acked = false;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("no summary push within {TIMEOUT:?}");
        }
        let msg = match tokio::time::timeout(TIMEOUT, ws.next()).await? {
            Some(msg) => msg?,
            None => anyhow::bail!("socket closed"),
        };
        let Message::Text(text) = msg else { continue };
        let value: Value = serde_json::from_str(text.as_str())?;
        match value["event"].as_str() {
            Some("subscribed") => acked = true,
            Some("global_summary") => {
                assert!(acked, "push arrived before the subscribe ack");
                assert_eq!(
                    value["nodes"],
                    json!([{"node": "Alpha", "ok": true, "summary": {"summary": {"calls": 3}}}])
                );
                return Ok(());
            }
            _ => {}
        }
    }
}
