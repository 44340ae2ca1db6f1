// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event shape emitted by the engine and carried over the transport
//! (design §3 / §4.5, frame type `event`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

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

impl Event {
    pub fn new(agent_id: &str, event_type: EventType, payload: Value, now_iso8601: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            agent_id: agent_id.to_owned(),
            timestamp: now_iso8601.to_owned(),
            event_type,
            payload,
        }
    }
}
