// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol types for the agent<->dashboard WebSocket (design §4.5 /
//! C5, §6), mirrored independently on the dashboard side. The dashboard
//! does not depend on the `ztp-agent` crate as a library: each binary
//! owns its side of the wire contract, the way the teacher keeps its
//! server and client binaries free of a shared internal crate.
//!
//! All frames are UTF-8 JSON objects carrying `type` and `timestamp`;
//! unknown types are logged and dropped, never fatal.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Agent -> dashboard frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentFrame {
    Register {
        timestamp: String,
        agent_id: String,
        hostname: String,
        subnet: String,
        version: String,
        capabilities: Vec<String>,
    },
    Heartbeat {
        timestamp: String,
        ztp_running: bool,
        devices_known: usize,
    },
    Event {
        timestamp: String,
        event: Event,
    },
    Inventory {
        timestamp: String,
        devices: Vec<Device>,
    },
    RpcResult {
        timestamp: String,
        request_id: String,
        ok: bool,
        result: Value,
    },
    /// Catch-all for a frame type this dashboard version does not
    /// recognize. Never produced by serde directly; the WS handler falls
    /// back to this rather than closing the socket (design §6).
    #[serde(skip)]
    Unknown,
}

/// Dashboard -> agent frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardFrame {
    Configure {
        timestamp: String,
        config: ConfigureDelta,
    },
    Control {
        timestamp: String,
        action: ControlAction,
    },
    RpcCall {
        timestamp: String,
        request_id: String,
        op: String,
        args: Value,
    },
    Ping {
        timestamp: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigureDelta {
    pub seeds: Vec<String>,
    pub credentials: Vec<Credential>,
    pub preferred_password: String,
    pub base_config: String,
    pub vlan_plan: VlanPlan,
    pub poll_interval_ms: Option<u64>,
    pub fast_discovery: bool,
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VlanPlan {
    pub management_vlan: u16,
    pub wireless_vlans: Vec<u16>,
    pub gateway: Option<String>,
    pub dns: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentRegistered,
    AgentDisconnected,
    Heartbeat,
    ZtpStarted,
    ZtpStopped,
    DeviceDiscovered,
    DeviceUpdated,
    DeviceConfigured,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub agent_id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Switch,
    Ap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Discovered,
    Connecting,
    Configuring,
    Configured,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub remote_chassis_mac: Option<String>,
    pub remote_port_id: String,
    pub remote_system_name: String,
    pub remote_system_description: String,
    pub remote_mgmt_ip: Option<String>,
}

/// Shadow-inventory device shape, identical on the wire to the agent's
/// own `Device` (design §3: "last-writer-wins per IP"). The dashboard
/// never mutates these fields itself — it only ever replaces a whole
/// entry from an inbound `inventory` frame or the device snapshot
/// embedded in `device_discovered`/`device_updated`/`device_configured`
/// event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub is_seed: bool,
    pub base_config_applied: bool,
    pub configured: bool,
    pub neighbors: IndexMap<String, Neighbor>,
    pub connected_switch: Option<String>,
    pub connected_port: Option<String>,
    pub ap_ports: BTreeSet<String>,
    pub tasks_completed: Vec<String>,
    pub tasks_failed: Vec<String>,
    pub ssh_active: bool,
    pub last_seen: u64,
}

/// Parse an inbound agent frame, tolerating unknown `type` values by
/// returning `AgentFrame::Unknown` instead of propagating a decode error.
pub fn parse_agent_frame(raw: &str) -> Result<AgentFrame, serde_json::Error> {
    match serde_json::from_str::<AgentFrame>(raw) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            if let Ok(value) = serde_json::from_str::<Value>(raw) {
                if value.get("type").is_some() {
                    return Ok(AgentFrame::Unknown);
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
