// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol frame types for the agent<->dashboard WebSocket (design
//! §4.5 / C5, §6). All frames are UTF-8 JSON objects carrying a `type` and
//! a `timestamp`; unknown types are logged and dropped, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::inventory::Device;

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
    /// Catch-all for any frame type this agent version does not recognize.
    /// Deserializing into this variant never happens automatically (serde's
    /// adjacently/internally tagged enums reject unknown tags); the
    /// transport layer falls back to this when the `type` tag is unknown,
    /// rather than closing the socket.
    #[serde(skip)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
}

/// A full configuration replacement pushed from the dashboard (design
/// §4.4 step 1, "intake"). Applied atomically at the next tick boundary.
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

/// Parse an inbound dashboard frame, tolerating unknown `type` values by
/// returning `DashboardFrame::Unknown` instead of propagating a decode
/// error (design §6: unknown frame types are logged and dropped).
pub fn parse_dashboard_frame(raw: &str) -> Result<DashboardFrame, serde_json::Error> {
    match serde_json::from_str::<DashboardFrame>(raw) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            // Distinguish "valid JSON, unrecognized type tag" from actually
            // malformed JSON: peek at the `type` field independently.
            if let Ok(value) = serde_json::from_str::<Value>(raw) {
                if value.get("type").is_some() {
                    return Ok(DashboardFrame::Unknown);
                }
            }
            Err(e)
        }
    }
}
