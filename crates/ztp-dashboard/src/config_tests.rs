// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> DashboardConfig {
    let mut full = vec!["ztp-dashboard"];
    full.extend_from_slice(args);
    DashboardConfig::parse_from(full)
}

#[test]
fn defaults_match_design_doc() {
    let cfg = parse(&[]);
    assert_eq!(cfg.host, "0.0.0.0");
    assert_eq!(cfg.port, 8900);
    assert_eq!(cfg.heartbeat_interval_ms, 30_000);
    assert_eq!(cfg.heartbeat_timeout_multiplier, 3);
    assert_eq!(cfg.event_log_capacity, 1000);
    assert_eq!(cfg.event_rate_limit_per_minute, 30);
}

#[test]
fn heartbeat_timeout_is_interval_times_multiplier() {
    let cfg = parse(&["--heartbeat-interval-ms", "10000", "--heartbeat-timeout-multiplier", "4"]);
    assert_eq!(cfg.heartbeat_timeout(), std::time::Duration::from_millis(40_000));
}

#[test]
fn bind_addr_joins_host_and_port() {
    let cfg = parse(&["--host", "127.0.0.1", "--port", "9100"]);
    assert_eq!(cfg.bind_addr(), "127.0.0.1:9100");
}
