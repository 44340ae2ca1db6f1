// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The outbound WebSocket transport client (design §4.5 / C5).
//!
//! One persistent connection to the dashboard, with exponential reconnect,
//! a bounded drop-oldest event buffer that survives disconnects, and
//! request/response correlation for inbound `rpc_call` frames. Transport
//! errors never propagate to the engine (design §7): this module only
//! ever talks to the engine through [`EngineHandle`] and an events
//! channel.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::event::{Event, EventType};
use crate::rpc;
use crate::time::now_iso8601;
use crate::transport::frame::{AgentFrame, DashboardFrame};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RPC_TIMEOUT: Duration = Duration::from_secs(120);

/// Static identity and addressing for one agent's transport connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub websocket_url: String,
    pub auth_token: String,
    pub agent_id: String,
    pub hostname: String,
    pub subnet: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub event_buffer_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_url: String::new(),
            auth_token: String::new(),
            agent_id: String::new(),
            hostname: String::new(),
            subnet: String::new(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            capabilities: vec!["ztp".to_owned()],
            reconnect_base: Duration::from_secs(30),
            reconnect_max: Duration::from_secs(300),
            event_buffer_capacity: 1024,
        }
    }
}

/// Drive the transport until `cancel` fires. Runs forever, reconnecting
/// with exponential backoff on any disconnect (design §4.5).
pub async fn run(
    config: TransportConfig,
    handle: EngineHandle,
    mut events_rx: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
) {
    let mut pending: VecDeque<Event> = VecDeque::new();
    let mut dropped: u64 = 0;
    let mut backoff = config.reconnect_base;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match connect_once(&config, &handle, &mut events_rx, &mut pending, &mut dropped, &cancel, &mut backoff).await
        {
            ConnectOutcome::Shutdown => break,
            ConnectOutcome::Disconnected => {
                warn!(agent_id = %config.agent_id, backoff = ?backoff, "transport disconnected, reconnecting");
            }
            ConnectOutcome::ConnectFailed => {
                debug!(agent_id = %config.agent_id, backoff = ?backoff, "transport connect failed");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = absorb_while_waiting(&mut events_rx, &mut pending, &mut dropped, config.event_buffer_capacity, &cancel) => {
                break;
            }
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }

    info!(agent_id = %config.agent_id, "transport stopped");
}

enum ConnectOutcome {
    Shutdown,
    Disconnected,
    ConnectFailed,
}

/// Drain `events_rx` into `pending` (bounded, drop-oldest) for the
/// duration of the reconnect backoff sleep, so the unbounded engine
/// channel never grows past the transport's buffer bound while offline.
/// Returns once `cancel` fires; otherwise runs forever (the caller races
/// it against the backoff sleep).
async fn absorb_while_waiting(
    events_rx: &mut mpsc::UnboundedReceiver<Event>,
    pending: &mut VecDeque<Event>,
    dropped: &mut u64,
    capacity: usize,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            ev = events_rx.recv() => {
                match ev {
                    Some(ev) => push_bounded(pending, dropped, capacity, ev),
                    None => std::future::pending::<()>().await,
                }
            }
        }
    }
}

fn push_bounded(pending: &mut VecDeque<Event>, dropped: &mut u64, capacity: usize, ev: Event) {
    if pending.len() >= capacity {
        pending.pop_front();
        *dropped += 1;
    }
    pending.push_back(ev);
}

async fn connect_once(
    config: &TransportConfig,
    handle: &EngineHandle,
    events_rx: &mut mpsc::UnboundedReceiver<Event>,
    pending: &mut VecDeque<Event>,
    dropped: &mut u64,
    cancel: &CancellationToken,
    backoff: &mut Duration,
) -> ConnectOutcome {
    let mut request = match config.websocket_url.clone().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            warn!(agent_id = %config.agent_id, error = %e, "invalid websocket url");
            return ConnectOutcome::ConnectFailed;
        }
    };
    let bearer = match HeaderValue::from_str(&format!("Bearer {}", config.auth_token)) {
        Ok(v) => v,
        Err(e) => {
            warn!(agent_id = %config.agent_id, error = %e, "invalid auth token header");
            return ConnectOutcome::ConnectFailed;
        }
    };
    request.headers_mut().insert("authorization", bearer);

    let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(agent_id = %config.agent_id, error = %e, "websocket connect failed");
            return ConnectOutcome::ConnectFailed;
        }
    };
    info!(agent_id = %config.agent_id, "connected to dashboard");

    let (mut write, mut read) = ws_stream.split();

    let register = AgentFrame::Register {
        timestamp: now_iso8601(),
        agent_id: config.agent_id.clone(),
        hostname: config.hostname.clone(),
        subnet: config.subnet.clone(),
        version: config.version.clone(),
        capabilities: config.capabilities.clone(),
    };
    if send_frame(&mut write, &register).await.is_err() {
        return ConnectOutcome::ConnectFailed;
    }
    // A clean register round-trip resets the backoff; a connection that
    // dies before it ever registers keeps climbing the backoff curve.
    *backoff = config.reconnect_base;

    if *dropped > 0 {
        let n = *dropped;
        *dropped = 0;
        let event = Event::new(
            &config.agent_id,
            EventType::Error,
            json!({"phase": "transport", "kind": "RateLimited", "message": format!("{n} events dropped while disconnected")}),
            &now_iso8601(),
        );
        let _ = send_frame(&mut write, &AgentFrame::Event { timestamp: now_iso8601(), event }).await;
    }

    while let Some(ev) = pending.pop_front() {
        let frame = AgentFrame::Event { timestamp: now_iso8601(), event: ev.clone() };
        if send_frame(&mut write, &frame).await.is_err() {
            pending.push_front(ev);
            return ConnectOutcome::Disconnected;
        }
    }

    let (rpc_tx, mut rpc_rx) = mpsc::unbounded_channel::<AgentFrame>();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ConnectOutcome::Shutdown,
            _ = heartbeat.tick() => {
                let snapshot = handle.snapshot();
                let frame = AgentFrame::Heartbeat {
                    timestamp: now_iso8601(),
                    ztp_running: true,
                    devices_known: snapshot.len(),
                };
                if send_frame(&mut write, &frame).await.is_err() {
                    return ConnectOutcome::Disconnected;
                }
            }
            maybe_ev = events_rx.recv() => {
                match maybe_ev {
                    Some(ev) => {
                        let frame = AgentFrame::Event { timestamp: now_iso8601(), event: ev.clone() };
                        if send_frame(&mut write, &frame).await.is_err() {
                            push_bounded(pending, dropped, usize::MAX, ev);
                            return ConnectOutcome::Disconnected;
                        }
                    }
                    None => return ConnectOutcome::Shutdown,
                }
            }
            maybe_result = rpc_rx.recv() => {
                if let Some(frame) = maybe_result {
                    if send_frame(&mut write, &frame).await.is_err() {
                        return ConnectOutcome::Disconnected;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&text, handle, &rpc_tx, config.agent_id.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => return ConnectOutcome::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(agent_id = %config.agent_id, error = %e, "websocket read error");
                        return ConnectOutcome::Disconnected;
                    }
                }
            }
        }
    }
}

fn handle_inbound(
    text: &str,
    handle: &EngineHandle,
    rpc_tx: &mpsc::UnboundedSender<AgentFrame>,
    agent_id: &str,
) {
    let frame = match crate::transport::frame::parse_dashboard_frame(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(agent_id, error = %e, "malformed dashboard frame, dropping");
            return;
        }
    };

    match frame {
        DashboardFrame::Configure { config, .. } => handle.push_configure(config),
        DashboardFrame::Control { action, .. } => handle.push_control(action),
        DashboardFrame::Ping { .. } => {}
        DashboardFrame::RpcCall { request_id, op, args, .. } => {
            let handle = handle.clone();
            let rpc_tx = rpc_tx.clone();
            let timeout_ms = args.get("timeout_ms").and_then(serde_json::Value::as_u64);
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RPC_TIMEOUT)
                .min(MAX_RPC_TIMEOUT);
            tokio::spawn(async move {
                let outcome = rpc::dispatch(&handle, &op, &args, timeout).await;
                let frame = match outcome {
                    Ok(result) => {
                        AgentFrame::RpcResult { timestamp: now_iso8601(), request_id, ok: true, result }
                    }
                    Err(e) => AgentFrame::RpcResult {
                        timestamp: now_iso8601(),
                        request_id,
                        ok: false,
                        result: json!({"kind": e.kind.as_str(), "message": e.message}),
                    },
                };
                let _ = rpc_tx.send(frame);
            });
        }
        DashboardFrame::Unknown => {
            debug!(agent_id, "ignoring unrecognized dashboard frame type");
        }
    }
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

async fn send_frame(write: &mut WsSink, frame: &AgentFrame) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    write.send(Message::Text(text.into())).await.map_err(|_| ())
}
