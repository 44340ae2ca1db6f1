// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ztp-dashboard: fleet aggregator for edge `ztp-agent` processes.

pub mod config;
pub mod error;
pub mod event_log;
pub mod protocol;
pub mod rpc;
pub mod state;
pub mod time;
pub mod transport;

use std::sync::Arc;

use rand::Rng;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::DashboardConfig;
use crate::protocol::EventType;
use crate::state::DashboardState;
use crate::transport::build_router;

/// Run the dashboard server until shutdown.
pub async fn run(config: DashboardConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let shutdown = CancellationToken::new();
    let cookie_key = resolve_cookie_key(&config);
    let heartbeat_timeout = config.heartbeat_timeout();

    let state = Arc::new(DashboardState::new(config, shutdown.clone(), cookie_key));

    spawn_heartbeat_reaper(Arc::clone(&state), heartbeat_timeout);

    tracing::info!(%addr, "ztp-dashboard listening");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Derive a fixed-length HMAC key from the configured secret, or generate a
/// random one at startup when unset (design §6/§4.8 expansion: "sessions
/// will not survive a restart" in that case, which matches the no-persistence
/// non-goal).
fn resolve_cookie_key(config: &DashboardConfig) -> Vec<u8> {
    match &config.cookie_secret {
        Some(secret) => ring::digest::digest(&ring::digest::SHA256, secret.as_bytes()).as_ref().to_vec(),
        None => {
            let mut key = vec![0u8; 32];
            rand::rng().fill(&mut key[..]);
            tracing::warn!("no cookie secret configured, generated an ephemeral one for this run");
            key
        }
    }
}

/// Periodically sweep agents past their heartbeat deadline, marking them
/// offline and logging `agent_disconnected` for each (design §4.6 / C6).
fn spawn_heartbeat_reaper(state: Arc<DashboardState>, timeout: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(timeout / 2);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let newly_offline = state.sweep_offline(timeout).await;
                    for agent_id in newly_offline {
                        tracing::info!(%agent_id, "agent heartbeat timed out");
                        state
                            .event_log
                            .push(crate::transport::ws::synthetic_event(
                                &agent_id,
                                EventType::AgentDisconnected,
                                serde_json::json!({"reason": "heartbeat_timeout"}),
                            ))
                            .await;
                    }
                }
            }
        }
    });
}
