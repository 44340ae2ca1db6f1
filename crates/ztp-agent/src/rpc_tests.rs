// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch, Mutex};

use super::*;
use crate::engine::EngineHandle;

fn idle_handle() -> EngineHandle {
    let (intake_tx, _intake_rx) = mpsc::unbounded_channel();
    let (_inventory_tx, inventory_rx) = watch::channel(Vec::new());
    EngineHandle { intake_tx, inventory_rx, busy_ips: Arc::new(Mutex::new(HashSet::new())) }
}

async fn busy_handle(ip: &str) -> EngineHandle {
    let handle = idle_handle();
    handle.busy_ips.lock().await.insert(ip.to_owned());
    handle
}

#[tokio::test]
async fn missing_target_ip_is_a_parse_error() {
    let handle = idle_handle();
    let err = dispatch(&handle, "run_show", &json!({}), Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[tokio::test]
async fn unknown_op_is_a_parse_error() {
    let handle = idle_handle();
    let args = json!({"target_ip": "192.168.1.10"});
    let err = dispatch(&handle, "reboot", &args, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[tokio::test]
async fn busy_engine_fails_fast_without_opening_a_session() {
    let handle = busy_handle("192.168.1.10").await;
    let args = json!({
        "target_ip": "192.168.1.10",
        "username": "super",
        "password": "sp-admin",
        "command": "show version",
    });
    let err = dispatch(&handle, "run_show", &args, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Busy);
}

#[tokio::test]
async fn run_show_missing_command_is_a_parse_error_before_any_session_is_opened() {
    let handle = idle_handle();
    let args = json!({"target_ip": "192.168.1.10", "username": "super", "password": "sp-admin"});
    let err = dispatch(&handle, "run_show", &args, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[tokio::test]
async fn set_vlan_missing_port_is_a_parse_error() {
    let handle = idle_handle();
    let args = json!({"target_ip": "192.168.1.10", "username": "super", "password": "sp-admin", "vlan": 20});
    let err = dispatch(&handle, "set_vlan", &args, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}

#[tokio::test]
async fn set_poe_missing_port_is_a_parse_error() {
    let handle = idle_handle();
    let args = json!({"target_ip": "192.168.1.10", "username": "super", "password": "sp-admin", "on": true});
    let err = dispatch(&handle, "set_poe", &args, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
}
