// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the dashboard API and browser UI (design §4.8 / C8).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;
use crate::protocol::{ConfigureDelta, ControlAction, DashboardFrame, Device, Event, EventType};
use crate::rpc::RpcOutcome;
use crate::state::{AgentStatus, AgentSummary, DashboardState};
use crate::time;
use crate::transport::auth;

const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;
const MAX_RPC_TIMEOUT_MS: u64 = 120_000;

/// `GET /api/v1/health` (design §6: every process in this family exposes
/// one, even though the distilled spec's Non-goals exclude metrics).
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /` — HTML list of connected and recently-seen agents.
pub async fn index(State(state): State<Arc<DashboardState>>) -> Html<String> {
    let summaries = state.summaries().await;
    let rows: String = summaries
        .iter()
        .map(|a| {
            format!(
                "<tr><td><a href=\"/{id}\">{id}</a></td><td>{status:?}</td><td>{host}</td><td>{devices}</td></tr>",
                id = a.agent_id,
                status = a.status,
                host = a.hostname,
                devices = a.device_count,
            )
        })
        .collect();
    Html(format!(
        "<html><body><h1>ZTP Fleet</h1><table><tr><th>Agent</th><th>Status</th><th>Hostname</th><th>Devices</th></tr>{rows}</table></body></html>"
    ))
}

/// `GET /{agent_id}` — per-agent view. Shows an inline login form on
/// first access when the agent has a password set and no valid session
/// cookie is present yet (design §4.8).
pub async fn agent_view(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Response {
    let Some(record) = state.get(&agent_id).await else {
        return DashboardError::not_found(format!("unknown agent {agent_id}")).into_response();
    };

    let has_password = record.password_hash.read().await.is_some();
    let authorized = !has_password
        || auth::extract_cookie(&headers)
            .is_some_and(|c| auth::verify_session_cookie(&state.cookie_key, &c, &agent_id));

    if !authorized {
        return Html(login_form_html(&agent_id)).into_response();
    }

    Html(format!(
        "<html><body><h1>Agent {agent_id}</h1><p>status: {:?}</p><p><a href=\"/api/edge-agents/{agent_id}\">inventory JSON</a></p></body></html>",
        *record.status.read().await
    ))
    .into_response()
}

fn login_form_html(agent_id: &str) -> String {
    format!(
        "<html><body><h1>Login to {agent_id}</h1><form method=\"post\" action=\"/{agent_id}/login\">\
         <input type=\"password\" name=\"password\"/><button type=\"submit\">Log in</button></form></body></html>"
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// `POST /{agent_id}/login` — verify the per-agent password and issue a
/// session cookie scoped to this agent id (design §4.8 expansion).
pub async fn login_submit(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let Some(record) = state.get(&agent_id).await else {
        return DashboardError::not_found(format!("unknown agent {agent_id}")).into_response();
    };

    let Some(stored_hash) = record.password_hash.read().await.clone() else {
        return Redirect::to(&format!("/{agent_id}")).into_response();
    };

    if !auth::verify_password(&body.password, &stored_hash) {
        return DashboardError::auth("incorrect password").into_response();
    }

    let cookie = auth::sign_session_cookie(&state.cookie_key, &agent_id);
    let mut response = Redirect::to(&format!("/{agent_id}")).into_response();
    if let Ok(value) = auth::set_cookie_header(&cookie).parse() {
        response.headers_mut().insert(axum::http::header::SET_COOKIE, value);
    }
    response
}

/// `GET /api/edge-agents` — summary of all agents.
pub async fn list_agents(State(state): State<Arc<DashboardState>>) -> Json<Vec<AgentSummary>> {
    Json(state.summaries().await)
}

#[derive(Debug, Serialize)]
pub struct AgentDetailResponse {
    pub agent_id: String,
    pub hostname: String,
    pub subnet: String,
    pub version: String,
    pub status: AgentStatus,
    pub ztp_running: bool,
    pub devices: Vec<Device>,
}

/// `GET /api/edge-agents/{agent_id}` — details incl. shadow inventory.
pub async fn agent_detail(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentDetailResponse>, DashboardError> {
    let record = state
        .get(&agent_id)
        .await
        .ok_or_else(|| DashboardError::not_found(format!("unknown agent {agent_id}")))?;

    Ok(Json(AgentDetailResponse {
        agent_id: record.agent_id.clone(),
        hostname: record.hostname.read().await.clone(),
        subnet: record.subnet.read().await.clone(),
        version: record.version.read().await.clone(),
        status: *record.status.read().await,
        ztp_running: *record.ztp_running.read().await,
        devices: record.shadow_inventory.read().await.values().cloned().collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub target_ip: String,
    pub username: String,
    pub password: String,
    pub command: Option<String>,
    pub port: Option<String>,
    pub vlan: Option<u16>,
    pub mode: Option<String>,
    pub on: Option<bool>,
    pub op: String,
    pub timeout_ms: Option<u64>,
}

/// `POST /api/edge-agents/{agent_id}/command` — forwards an `rpc_call`
/// to the target agent and waits (bounded by `timeout`) for its result
/// (design §4.9 / C9).
pub async fn post_command(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<CommandRequest>,
) -> Result<Json<RpcOutcome>, DashboardError> {
    let record = state
        .get(&agent_id)
        .await
        .ok_or_else(|| DashboardError::not_found(format!("unknown agent {agent_id}")))?;

    if !record.is_online().await {
        return Err(DashboardError::agent_offline(&agent_id));
    }

    let timeout_ms = body
        .timeout_ms
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS)
        .min(MAX_RPC_TIMEOUT_MS);

    let mut args = serde_json::json!({
        "target_ip": body.target_ip,
        "username": body.username,
        "password": body.password,
    });
    if let Some(obj) = args.as_object_mut() {
        if let Some(command) = body.command {
            obj.insert("command".to_owned(), serde_json::Value::String(command));
        }
        if let Some(port) = body.port {
            obj.insert("port".to_owned(), serde_json::Value::String(port));
        }
        if let Some(vlan) = body.vlan {
            obj.insert("vlan".to_owned(), serde_json::json!(vlan));
        }
        if let Some(mode) = body.mode {
            obj.insert("mode".to_owned(), serde_json::Value::String(mode));
        }
        if let Some(on) = body.on {
            obj.insert("on".to_owned(), serde_json::json!(on));
        }
    }

    let (request_id, waiter) = state.rpc_waiters.register(&agent_id).await;
    record
        .send(DashboardFrame::RpcCall {
            timestamp: time::now_iso8601(),
            request_id: request_id.clone(),
            op: body.op,
            args,
        })
        .await?;

    match tokio::time::timeout(Duration::from_millis(timeout_ms), waiter).await {
        Ok(Ok(outcome)) if outcome.ok => Ok(Json(outcome)),
        Ok(Ok(outcome)) => Err(DashboardError::from_rpc_error(&outcome.result)),
        Ok(Err(_)) => Err(DashboardError::agent_offline(&agent_id)),
        Err(_) => {
            state.rpc_waiters.abandon(&request_id).await;
            Err(DashboardError::timeout(format!("rpc_call to {agent_id} timed out")))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ZtpStatusResponse {
    pub agents: usize,
    pub running: usize,
    pub switches_discovered: usize,
    pub switches_configured: usize,
    pub aps_discovered: usize,
}

/// `GET /api/ztp/status` — aggregated status across all agents.
pub async fn ztp_status(State(state): State<Arc<DashboardState>>) -> Json<ZtpStatusResponse> {
    let agents = state.agents.read().await;
    let mut running = 0usize;
    let mut switches_discovered = 0usize;
    let mut switches_configured = 0usize;
    let mut aps_discovered = 0usize;

    for record in agents.values() {
        if *record.ztp_running.read().await {
            running += 1;
        }
        for device in record.shadow_inventory.read().await.values() {
            match device.device_type {
                crate::protocol::DeviceType::Switch => {
                    switches_discovered += 1;
                    if device.configured {
                        switches_configured += 1;
                    }
                }
                crate::protocol::DeviceType::Ap => aps_discovered += 1,
            }
        }
    }

    Json(ZtpStatusResponse {
        agents: agents.len(),
        running,
        switches_discovered,
        switches_configured,
        aps_discovered,
    })
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub since: Option<String>,
    pub limit: Option<usize>,
    pub agent_id: Option<String>,
}

/// `GET /api/ztp/events?type=&since=&limit=` — from the event log.
pub async fn ztp_events(
    State(state): State<Arc<DashboardState>>,
    Query(q): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, DashboardError> {
    let event_type = match q.event_type.as_deref() {
        None => None,
        Some(raw) => Some(parse_event_type(raw)?),
    };
    let events = state
        .event_log
        .query(q.agent_id.as_deref(), event_type, q.since.as_deref(), q.limit.unwrap_or(100))
        .await;
    Ok(Json(events))
}

fn parse_event_type(raw: &str) -> Result<EventType, DashboardError> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .map_err(|_| DashboardError::new(crate::error::ErrorKind::ParseError, format!("unknown event type {raw:?}")))
}

#[derive(Debug, Serialize)]
pub struct InventoryDeviceEntry {
    pub agent_id: String,
    #[serde(flatten)]
    pub device: Device,
}

/// `GET /api/ztp/inventory` — merged device list across agents, tagged
/// with agent id.
pub async fn ztp_inventory(
    State(state): State<Arc<DashboardState>>,
) -> Json<Vec<InventoryDeviceEntry>> {
    let agents = state.agents.read().await;
    let mut out = Vec::new();
    for record in agents.values() {
        for device in record.shadow_inventory.read().await.values() {
            out.push(InventoryDeviceEntry { agent_id: record.agent_id.clone(), device: device.clone() });
        }
    }
    Json(out)
}

/// `POST /api/edge-agents/{agent_id}/config` — send a `configure` frame.
pub async fn post_config(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
    Json(config): Json<ConfigureDelta>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let record = state
        .get(&agent_id)
        .await
        .ok_or_else(|| DashboardError::not_found(format!("unknown agent {agent_id}")))?;
    record.send(DashboardFrame::Configure { timestamp: time::now_iso8601(), config }).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
}

/// `POST /api/edge-agents/{agent_id}/control` — start/stop.
pub async fn post_control(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<ControlRequest>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let record = state
        .get(&agent_id)
        .await
        .ok_or_else(|| DashboardError::not_found(format!("unknown agent {agent_id}")))?;
    record.send(DashboardFrame::Control { timestamp: time::now_iso8601(), action: body.action }).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

/// Set the agent's password hash at first registration. Not part of the
/// spec's numbered endpoint table, but required to get a hash onto the
/// `AgentRecord` at all (design §4.8: "a hash is stored on the agent
/// record at first registration" — the agent pushes it here once, out of
/// band from the WS protocol, using its own locally generated secret).
#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password_hash: String,
}

pub async fn set_password(
    State(state): State<Arc<DashboardState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<SetPasswordRequest>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let record = state
        .get(&agent_id)
        .await
        .ok_or_else(|| DashboardError::not_found(format!("unknown agent {agent_id}")))?;
    let mut existing = record.password_hash.write().await;
    if existing.is_some() {
        return Err(DashboardError::new(
            crate::error::ErrorKind::ConfigError,
            "password already set for this agent",
        ));
    }
    *existing = Some(body.password_hash);
    Ok(Json(serde_json::json!({"ok": true})))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
