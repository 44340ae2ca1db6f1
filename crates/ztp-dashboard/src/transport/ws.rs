// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound agent WebSocket handler (design §4.5/§4.6 / C5, C6). Agents
//! dial outbound to this endpoint; the dashboard accepts, authenticates
//! via the shared bearer token, and holds the connection open for the
//! lifetime of the agent's registration.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;

use crate::protocol::{self, AgentFrame, DashboardFrame, Event, EventType};
use crate::state::DashboardState;
use crate::time;
use crate::transport::auth;

/// `GET /ws/agent/{agent_id}` — WebSocket upgrade for an edge agent.
pub async fn ws_handler(
    State(state): State<Arc<DashboardState>>,
    Path(path_agent_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(e) = auth::validate_bearer(&headers, state.config.agent_auth_token.as_deref()) {
        return e.into_response();
    }

    ws.on_upgrade(move |socket| handle_agent_ws(socket, state, path_agent_id)).into_response()
}

async fn handle_agent_ws(socket: WebSocket, state: Arc<DashboardState>, path_agent_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<DashboardFrame>();
    let mut registered_agent_id: Option<String> = None;
    // Captured once at registration: the token *this* connection owns. A
    // later connection for the same agent id cancels this exact token
    // object before installing its own fresh one on the record, so we
    // must hold our own clone rather than re-reading the record live.
    let mut my_cancel: Option<tokio_util::sync::CancellationToken> = None;

    loop {
        let cancelled = async {
            match &my_cancel {
                Some(token) => token.clone().cancelled_owned().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancelled => {
                tracing::debug!(agent_id = ?registered_agent_id, "connection superseded, closing");
                break;
            }
            frame = out_rx.recv() => {
                match frame {
                    Some(frame) => {
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match protocol::parse_agent_frame(&text) {
                            Ok(frame) => {
                                handle_inbound(&state, &path_agent_id, frame, &out_tx, &mut registered_agent_id, &mut my_cancel).await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "malformed agent frame, dropping");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "agent websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if let Some(agent_id) = registered_agent_id {
        state.mark_offline(&agent_id).await;
        state.rpc_waiters.cancel_for_agent(&agent_id).await;
        state
            .event_log
            .push(synthetic_event(&agent_id, EventType::AgentDisconnected, json!({})))
            .await;
        tracing::info!(agent_id = %agent_id, "agent disconnected");
    }
}

async fn handle_inbound(
    state: &Arc<DashboardState>,
    path_agent_id: &str,
    frame: AgentFrame,
    out_tx: &tokio::sync::mpsc::UnboundedSender<DashboardFrame>,
    registered_agent_id: &mut Option<String>,
    my_cancel: &mut Option<tokio_util::sync::CancellationToken>,
) {
    match frame {
        AgentFrame::Register { agent_id, hostname, subnet, version, capabilities } => {
            if agent_id != path_agent_id {
                tracing::warn!(path_agent_id, %agent_id, "register frame agent id does not match path, ignoring");
                return;
            }
            let record = state.register(&agent_id, &hostname, &subnet, &version, out_tx.clone()).await;
            *my_cancel = Some(record.cancel.read().await.clone());
            *registered_agent_id = Some(agent_id.clone());
            state
                .event_log
                .push(synthetic_event(
                    &agent_id,
                    EventType::AgentRegistered,
                    json!({"hostname": hostname, "subnet": subnet, "version": version, "capabilities": capabilities}),
                ))
                .await;
            tracing::info!(%agent_id, %hostname, %version, "agent registered");
        }
        AgentFrame::Heartbeat { ztp_running, devices_known, .. } => {
            if let Some(agent_id) = registered_agent_id.as_deref() {
                state.touch_heartbeat(agent_id, ztp_running).await;
                let _ = devices_known;
            }
        }
        AgentFrame::Event { event, .. } => {
            if let Some(agent_id) = registered_agent_id.as_deref() {
                ingest_event(state, agent_id, event).await;
            }
        }
        AgentFrame::Inventory { devices, .. } => {
            if let Some(agent_id) = registered_agent_id.as_deref() {
                state.merge_inventory(agent_id, devices).await;
            }
        }
        AgentFrame::RpcResult { request_id, ok, result, .. } => {
            state.rpc_waiters.resolve(&request_id, ok, result).await;
        }
        AgentFrame::Unknown => {
            tracing::debug!("dropped unrecognized agent frame type");
        }
    }
}

/// Rate-limit, log, and fold an inbound `event` frame into the event log
/// and (for device lifecycle events) the shadow inventory (design §4.6:
/// default 30/minute, drop-with-warning over budget).
async fn ingest_event(state: &Arc<DashboardState>, agent_id: &str, event: Event) {
    let Some(record) = state.get(agent_id).await else { return };
    let allowed = record.rate_limiter.lock().await.allow();
    if !allowed {
        tracing::warn!(agent_id, "event rate limit exceeded, dropping event");
        return;
    }

    if matches!(
        event.event_type,
        EventType::DeviceDiscovered | EventType::DeviceUpdated | EventType::DeviceConfigured
    ) {
        if let Some(device) = event.payload.get("device") {
            if let Ok(device) = serde_json::from_value::<crate::protocol::Device>(device.clone()) {
                state.merge_inventory(agent_id, vec![device]).await;
            }
        }
    }

    state.event_log.push(event).await;
}

pub(crate) fn synthetic_event(agent_id: &str, event_type: EventType, payload: serde_json::Value) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4(),
        agent_id: agent_id.to_owned(),
        timestamp: time::now_iso8601(),
        event_type,
        payload,
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
