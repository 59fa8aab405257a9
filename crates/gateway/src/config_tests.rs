// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::GatewayConfig;

fn parse(args: &[&str]) -> GatewayConfig {
    GatewayConfig::parse_from(args)
}

#[test]
fn defaults_match_production_cadence_and_timeouts() -> anyhow::Result<()> {
    let config = parse(&["pbxgate"]);
    config.validate()?;
    assert_eq!(config.port, 5050);
    assert_eq!(config.broadcast_interval(), Duration::from_secs(5));
    assert_eq!(config.metadata_timeout(), Duration::from_secs(15));
    assert_eq!(config.bulk_timeout(), Duration::from_secs(60));
    assert_eq!(config.summary_timeout(), Duration::from_secs(10));
    assert_eq!(config.probe_timeout(), Duration::from_secs(8));
    assert!(config.fanout_limit.is_none());
    assert!(!config.insecure_upstream_tls);
    Ok(())
}

#[test]
fn explicit_nodes_file_wins() {
    let config = parse(&["pbxgate", "--nodes-file", "/tmp/nodes.json"]);
    assert_eq!(config.nodes_file(), PathBuf::from("/tmp/nodes.json"));
}

#[test]
fn default_nodes_file_lives_in_state_dir() {
    let config = parse(&["pbxgate"]);
    assert!(config.nodes_file().ends_with("nodes.json"));
}

#[yare::parameterized(
    zero_broadcast = { &["pbxgate", "--broadcast-ms", "0"], "--broadcast-ms" },
    zero_metadata  = { &["pbxgate", "--metadata-timeout-ms", "0"], "--metadata-timeout-ms" },
    zero_bulk      = { &["pbxgate", "--bulk-timeout-ms", "0"], "--bulk-timeout-ms" },
    zero_fanout    = { &["pbxgate", "--fanout-limit", "0"], "--fanout-limit" },
    bad_log_format = { &["pbxgate", "--log-format", "xml"], "invalid log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    let err = config.validate().err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains(expected_substr), "expected {expected_substr:?}, got {err:?}");
}
