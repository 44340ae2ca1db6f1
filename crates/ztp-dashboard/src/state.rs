// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared dashboard state: the agent registry (design §4.6 / C6) plus the
//! pieces hung off it (event log, RPC waiters, cookie key). Modeled on the
//! teacher's `MuxState`/`SessionEntry`/`Aggregator` triad, adapted for
//! agents that dial *out* to us rather than sessions we dial into.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::DashboardConfig;
use crate::event_log::EventLog;
use crate::protocol::{Device, DashboardFrame};
use crate::rpc::RpcWaiters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// Dashboard-side record for one edge agent (design §3, "Agent record").
pub struct AgentRecord {
    pub agent_id: String,
    pub hostname: RwLock<String>,
    pub subnet: RwLock<String>,
    pub version: RwLock<String>,
    pub status: RwLock<AgentStatus>,
    pub connected_at: RwLock<Instant>,
    pub last_seen: RwLock<Instant>,
    pub ztp_running: RwLock<bool>,
    pub shadow_inventory: RwLock<IndexMap<String, Device>>,
    /// Hash sent by the agent at registration; the dashboard never learns
    /// the plaintext password (design §4.8).
    pub password_hash: RwLock<Option<String>>,
    /// Sender half wired up by the live WS connection task; `None` while
    /// the agent is offline. Used to push `configure`/`control`/`rpc_call`
    /// frames down to the agent (design §4.9 / C9).
    pub outbound: RwLock<Option<mpsc::UnboundedSender<DashboardFrame>>>,
    /// Cancelled when this connection is superseded by a newer one for the
    /// same agent id (design §4.6: "new wins").
    pub cancel: RwLock<CancellationToken>,
    pub rate_limiter: tokio::sync::Mutex<RateWindow>,
}

impl AgentRecord {
    fn new(agent_id: String, now: Instant, limit_per_minute: u32) -> Self {
        Self {
            agent_id,
            hostname: RwLock::new(String::new()),
            subnet: RwLock::new(String::new()),
            version: RwLock::new(String::new()),
            status: RwLock::new(AgentStatus::Online),
            connected_at: RwLock::new(now),
            last_seen: RwLock::new(now),
            ztp_running: RwLock::new(false),
            shadow_inventory: RwLock::new(IndexMap::new()),
            password_hash: RwLock::new(None),
            outbound: RwLock::new(None),
            cancel: RwLock::new(CancellationToken::new()),
            rate_limiter: tokio::sync::Mutex::new(RateWindow::new(limit_per_minute)),
        }
    }

    pub async fn send(&self, frame: DashboardFrame) -> Result<(), crate::error::DashboardError> {
        let guard = self.outbound.read().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| crate::error::DashboardError::agent_offline(&self.agent_id)),
            None => Err(crate::error::DashboardError::agent_offline(&self.agent_id)),
        }
    }

    pub async fn is_online(&self) -> bool {
        *self.status.read().await == AgentStatus::Online
    }
}

/// A fixed one-minute sliding window counter for the inbound `event` frame
/// rate limit (design §4.6: default 30/minute, heartbeats unlimited).
#[derive(Debug)]
pub struct RateWindow {
    window_start: Instant,
    count: u32,
    limit: u32,
}

impl RateWindow {
    pub fn new(limit: u32) -> Self {
        Self { window_start: Instant::now(), count: 0, limit }
    }

    /// Returns `true` if this event is within budget for the current
    /// window; resets the window once a minute has elapsed.
    pub fn allow(&mut self) -> bool {
        if self.window_start.elapsed() >= Duration::from_secs(60) {
            self.window_start = Instant::now();
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.limit
    }
}

/// Shared dashboard state, one instance per process (design §9: "explicit
/// context value owned by the top-level component," not a global).
pub struct DashboardState {
    pub agents: RwLock<HashMap<String, Arc<AgentRecord>>>,
    pub config: DashboardConfig,
    pub shutdown: CancellationToken,
    pub event_log: EventLog,
    pub rpc_waiters: RpcWaiters,
    /// HMAC-SHA256 key for session cookies (design §4.8 expansion).
    pub cookie_key: Vec<u8>,
    seq: AtomicU64,
}

impl DashboardState {
    pub fn new(config: DashboardConfig, shutdown: CancellationToken, cookie_key: Vec<u8>) -> Self {
        let event_log = EventLog::new(config.event_log_capacity);
        Self {
            agents: RwLock::new(HashMap::new()),
            config,
            shutdown,
            event_log,
            rpc_waiters: RpcWaiters::new(),
            cookie_key,
            seq: AtomicU64::new(0),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a freshly connected agent WebSocket, reattaching to an
    /// existing offline record or evicting a stale online one (design
    /// §4.6: "if online, the older connection is closed; if offline,
    /// reattaches").
    pub async fn register(
        &self,
        agent_id: &str,
        hostname: &str,
        subnet: &str,
        version: &str,
        outbound: mpsc::UnboundedSender<DashboardFrame>,
    ) -> Arc<AgentRecord> {
        let now = Instant::now();
        let mut agents = self.agents.write().await;
        let record = match agents.get(agent_id) {
            Some(existing) => {
                if *existing.status.read().await == AgentStatus::Online {
                    existing.cancel.read().await.cancel();
                    *existing.cancel.write().await = CancellationToken::new();
                }
                Arc::clone(existing)
            }
            None => {
                let limit = self.config.event_rate_limit_per_minute;
                let fresh = Arc::new(AgentRecord::new(agent_id.to_owned(), now, limit));
                agents.insert(agent_id.to_owned(), Arc::clone(&fresh));
                fresh
            }
        };
        drop(agents);

        *record.hostname.write().await = hostname.to_owned();
        *record.subnet.write().await = subnet.to_owned();
        *record.version.write().await = version.to_owned();
        *record.status.write().await = AgentStatus::Online;
        *record.connected_at.write().await = now;
        *record.last_seen.write().await = now;
        *record.outbound.write().await = Some(outbound);
        record
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<AgentRecord>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn mark_offline(&self, agent_id: &str) {
        if let Some(record) = self.get(agent_id).await {
            *record.status.write().await = AgentStatus::Offline;
            *record.outbound.write().await = None;
        }
    }

    pub async fn touch_heartbeat(&self, agent_id: &str, ztp_running: bool) {
        if let Some(record) = self.get(agent_id).await {
            *record.last_seen.write().await = Instant::now();
            *record.ztp_running.write().await = ztp_running;
        }
    }

    pub async fn merge_inventory(&self, agent_id: &str, devices: Vec<Device>) {
        if let Some(record) = self.get(agent_id).await {
            let mut shadow = record.shadow_inventory.write().await;
            for device in devices {
                shadow.insert(device.ip.clone(), device);
            }
        }
    }

    /// Mark every agent missing heartbeats past the configured timeout as
    /// offline. Returns the agent ids that transitioned this sweep so the
    /// caller can append `agent_disconnected` events.
    pub async fn sweep_offline(&self, timeout: Duration) -> Vec<String> {
        let agents = self.agents.read().await;
        let mut newly_offline = Vec::new();
        for (id, record) in agents.iter() {
            if *record.status.read().await == AgentStatus::Online
                && record.last_seen.read().await.elapsed() >= timeout
            {
                *record.status.write().await = AgentStatus::Offline;
                *record.outbound.write().await = None;
                newly_offline.push(id.clone());
            }
        }
        newly_offline
    }

    pub async fn summaries(&self) -> Vec<AgentSummary> {
        let agents = self.agents.read().await;
        let mut out = Vec::with_capacity(agents.len());
        for record in agents.values() {
            out.push(AgentSummary {
                agent_id: record.agent_id.clone(),
                hostname: record.hostname.read().await.clone(),
                subnet: record.subnet.read().await.clone(),
                version: record.version.read().await.clone(),
                status: *record.status.read().await,
                ztp_running: *record.ztp_running.read().await,
                device_count: record.shadow_inventory.read().await.len(),
            });
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub hostname: String,
    pub subnet: String,
    pub version: String,
    pub status: AgentStatus,
    pub ztp_running: bool,
    pub device_count: usize,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
