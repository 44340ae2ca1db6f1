// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::DashboardConfig;
use crate::protocol::{Device, DeviceStatus, DeviceType};

fn test_config() -> DashboardConfig {
    DashboardConfig::parse_from(["ztp-dashboard"])
}

fn test_state() -> DashboardState {
    DashboardState::new(test_config(), CancellationToken::new(), vec![0u8; 32])
}

fn test_device(ip: &str) -> Device {
    Device {
        ip: ip.to_owned(),
        mac: None,
        hostname: None,
        model: None,
        serial: None,
        device_type: DeviceType::Switch,
        status: DeviceStatus::Configured,
        is_seed: true,
        base_config_applied: true,
        configured: true,
        neighbors: Default::default(),
        connected_switch: None,
        connected_port: None,
        ap_ports: Default::default(),
        tasks_completed: vec![],
        tasks_failed: vec![],
        ssh_active: false,
        last_seen: 0,
    }
}

#[tokio::test]
async fn register_creates_a_new_online_record() {
    let state = test_state();
    let (tx, _rx) = mpsc::unbounded_channel();
    let record = state.register("site-1", "host-a", "10.0.0.0/24", "0.11.25", tx).await;
    assert_eq!(record.agent_id, "site-1");
    assert!(record.is_online().await);
    assert_eq!(state.summaries().await.len(), 1);
}

#[tokio::test]
async fn register_reattaches_an_offline_record_and_preserves_shadow_inventory() {
    let state = test_state();
    let (tx1, _rx1) = mpsc::unbounded_channel();
    let first = state.register("site-1", "host-a", "10.0.0.0/24", "0.11.25", tx1).await;
    state.merge_inventory("site-1", vec![test_device("10.0.0.1")]).await;
    state.mark_offline("site-1").await;
    assert!(!first.is_online().await);

    let (tx2, _rx2) = mpsc::unbounded_channel();
    let second = state.register("site-1", "host-a", "10.0.0.0/24", "0.11.26", tx2).await;
    assert!(second.is_online().await);
    assert_eq!(second.shadow_inventory.read().await.len(), 1);
    assert_eq!(state.agents.read().await.len(), 1);
}

#[tokio::test]
async fn sweep_offline_transitions_agents_past_the_heartbeat_timeout() {
    let state = test_state();
    let (tx, _rx) = mpsc::unbounded_channel();
    let record = state.register("site-1", "host-a", "10.0.0.0/24", "0.11.25", tx).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let newly_offline = state.sweep_offline(Duration::from_millis(5)).await;
    assert_eq!(newly_offline, vec!["site-1".to_owned()]);
    assert!(!record.is_online().await);
}

#[tokio::test]
async fn sweep_offline_leaves_recently_seen_agents_online() {
    let state = test_state();
    let (tx, _rx) = mpsc::unbounded_channel();
    state.register("site-1", "host-a", "10.0.0.0/24", "0.11.25", tx).await;

    let newly_offline = state.sweep_offline(Duration::from_secs(60)).await;
    assert!(newly_offline.is_empty());
}

#[tokio::test]
async fn merge_inventory_is_last_writer_wins_per_ip() {
    let state = test_state();
    let (tx, _rx) = mpsc::unbounded_channel();
    let record = state.register("site-1", "host-a", "10.0.0.0/24", "0.11.25", tx).await;
    state.merge_inventory("site-1", vec![test_device("10.0.0.1")]).await;
    let mut updated = test_device("10.0.0.1");
    updated.hostname = Some("sw1".to_owned());
    state.merge_inventory("site-1", vec![updated]).await;

    let shadow = record.shadow_inventory.read().await;
    assert_eq!(shadow.len(), 1);
    assert_eq!(shadow.get("10.0.0.1").unwrap().hostname.as_deref(), Some("sw1"));
}

#[test]
fn rate_window_allows_up_to_limit_then_rejects() {
    let mut window = RateWindow::new(2);
    assert!(window.allow());
    assert!(window.allow());
    assert!(!window.allow());
}
