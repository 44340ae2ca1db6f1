// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `ztp-dashboard` binary and
//! drive it as an edge agent would, over its HTTP API and agent WebSocket.

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use ztp_specs::{connect_and_register, recv_json, DashboardProcess, TIMEOUT};

#[tokio::test]
async fn register_shows_up_in_agent_list() -> anyhow::Result<()> {
    let dashboard = DashboardProcess::start(None)?;
    dashboard.wait_healthy(TIMEOUT).await?;

    let _socket = connect_and_register(&dashboard, "site-1", "switch-closet-a").await?;

    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("agent never appeared in /api/edge-agents");
        }
        let body: serde_json::Value =
            client.get(format!("{}/api/edge-agents", dashboard.base_url())).send().await?.json().await?;
        if body.as_array().is_some_and(|agents| agents.iter().any(|a| a["agent_id"] == "site-1")) {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn ws_upgrade_without_bearer_token_is_rejected() -> anyhow::Result<()> {
    let dashboard = DashboardProcess::start(Some("s3cret"))?;
    dashboard.wait_healthy(TIMEOUT).await?;

    let result = connect_and_register(&dashboard, "site-1", "switch-closet-a").await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn ws_upgrade_with_correct_bearer_token_is_accepted() -> anyhow::Result<()> {
    let dashboard = DashboardProcess::start(Some("s3cret"))?;
    dashboard.wait_healthy(TIMEOUT).await?;

    let socket = connect_and_register(&dashboard, "site-1", "switch-closet-a").await;
    assert!(socket.is_ok());
    Ok(())
}

#[tokio::test]
async fn inventory_event_is_reflected_in_agent_detail() -> anyhow::Result<()> {
    let dashboard = DashboardProcess::start(None)?;
    dashboard.wait_healthy(TIMEOUT).await?;

    let mut socket = connect_and_register(&dashboard, "site-1", "switch-closet-a").await?;
    let inventory = serde_json::json!({
        "type": "inventory",
        "timestamp": "2026-01-01T00:00:01.000Z",
        "devices": [{
            "ip": "10.0.0.5",
            "mac": null,
            "hostname": null,
            "model": null,
            "serial": null,
            "device_type": "switch",
            "status": "configured",
            "is_seed": true,
            "base_config_applied": true,
            "configured": true,
            "neighbors": {},
            "connected_switch": null,
            "connected_port": null,
            "ap_ports": [],
            "tasks_completed": [],
            "tasks_failed": [],
            "ssh_active": false,
            "last_seen": 0,
        }],
    });
    socket.send(Message::Text(inventory.to_string().into())).await?;

    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("device never showed up in agent detail");
        }
        let body: serde_json::Value = client
            .get(format!("{}/api/edge-agents/site-1", dashboard.base_url()))
            .send()
            .await?
            .json()
            .await?;
        if body["devices"].as_array().is_some_and(|d| !d.is_empty()) {
            assert_eq!(body["devices"][0]["ip"], "10.0.0.5");
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn command_round_trips_through_rpc_call_and_rpc_result() -> anyhow::Result<()> {
    let dashboard = DashboardProcess::start(None)?;
    dashboard.wait_healthy(TIMEOUT).await?;

    let mut socket = connect_and_register(&dashboard, "site-1", "switch-closet-a").await?;

    let client = reqwest::Client::new();
    let command = client
        .post(format!("{}/api/edge-agents/site-1/command", dashboard.base_url()))
        .json(&serde_json::json!({
            "target_ip": "10.0.0.5",
            "username": "admin",
            "password": "secret",
            "command": "show version",
            "op": "run_show",
            "timeout_ms": 5000,
        }))
        .send();

    let rpc_call = recv_json(&mut socket).await?;
    assert_eq!(rpc_call["type"], "rpc_call");
    assert_eq!(rpc_call["op"], "run_show");
    let request_id = rpc_call["request_id"].as_str().unwrap().to_owned();

    let result = serde_json::json!({
        "type": "rpc_result",
        "timestamp": "2026-01-01T00:00:02.000Z",
        "request_id": request_id,
        "ok": true,
        "result": {"output": "ICX7150 Version 08.0.95"},
    });
    socket.send(Message::Text(result.to_string().into())).await?;

    let response: serde_json::Value = command.await?.json().await?;
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["output"], "ICX7150 Version 08.0.95");

    Ok(())
}

#[tokio::test]
async fn command_to_unknown_agent_returns_not_found() -> anyhow::Result<()> {
    let dashboard = DashboardProcess::start(None)?;
    dashboard.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/edge-agents/ghost/command", dashboard.base_url()))
        .json(&serde_json::json!({
            "target_ip": "10.0.0.5",
            "username": "admin",
            "password": "secret",
            "op": "run_show",
        }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 404);
    Ok(())
}
