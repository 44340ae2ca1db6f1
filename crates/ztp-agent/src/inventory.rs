// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's single-writer device inventory (design §3, §4.3 / C3).
//!
//! `Inventory` is owned exclusively by the ZTP engine's tick loop. Readers
//! (the transport snapshot path, RPC handlers) only ever see a `snapshot()`
//! copy, never a live reference, so there is no lock held across a
//! suspension point.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

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

/// A normalized LLDP neighbor record (design note: normalize the
/// polymorphic neighbor payload to one tagged shape at ingestion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub remote_chassis_mac: Option<String>,
    pub remote_port_id: String,
    pub remote_system_name: String,
    pub remote_system_description: String,
    pub remote_mgmt_ip: Option<String>,
}

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
    /// local port id -> neighbor record (switches only; empty for APs).
    pub neighbors: IndexMap<String, Neighbor>,
    pub connected_switch: Option<String>,
    pub connected_port: Option<String>,
    pub ap_ports: BTreeSet<String>,
    pub tasks_completed: Vec<String>,
    pub tasks_failed: Vec<String>,
    pub ssh_active: bool,
    pub last_seen: u64,
}

impl Device {
    fn new_switch(ip: &str, is_seed: bool, now: u64) -> Self {
        Self {
            ip: ip.to_owned(),
            mac: None,
            hostname: None,
            model: None,
            serial: None,
            device_type: DeviceType::Switch,
            status: DeviceStatus::Discovered,
            is_seed,
            base_config_applied: false,
            configured: false,
            neighbors: IndexMap::new(),
            connected_switch: None,
            connected_port: None,
            ap_ports: BTreeSet::new(),
            tasks_completed: Vec::new(),
            tasks_failed: Vec::new(),
            ssh_active: false,
            last_seen: now,
        }
    }

    fn new_ap(ip: &str, now: u64) -> Self {
        Self {
            ip: ip.to_owned(),
            mac: None,
            hostname: None,
            model: None,
            serial: None,
            device_type: DeviceType::Ap,
            status: DeviceStatus::Discovered,
            is_seed: false,
            base_config_applied: false,
            configured: false,
            neighbors: IndexMap::new(),
            connected_switch: None,
            connected_port: None,
            ap_ports: BTreeSet::new(),
            tasks_completed: Vec::new(),
            tasks_failed: Vec::new(),
            ssh_active: false,
            last_seen: now,
        }
    }
}

/// Single-writer device inventory, keyed by management IP.
///
/// `IndexMap` keeps insertion order so that snapshots and event emission
/// iterate devices deterministically (useful for convergence tests).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    devices: IndexMap<String, Device>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &str) -> Option<&Device> {
        self.devices.get(ip)
    }

    pub fn get_mut(&mut self, ip: &str) -> Option<&mut Device> {
        self.devices.get_mut(ip)
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.devices.contains_key(ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Create a `Device` entry for a seed IP if absent. Never downgrades an
    /// existing entry (I5: IP identity is immutable, re-discovery merges).
    pub fn upsert_seed(&mut self, ip: &str, now: u64) -> bool {
        if self.devices.contains_key(ip) {
            return false;
        }
        self.devices.insert(ip.to_owned(), Device::new_switch(ip, true, now));
        true
    }

    /// Record an LLDP/L2-trace neighbor observation from `local_switch_ip`
    /// on `local_port`. Returns the key of the newly created Device, if any
    /// (a management IP, or a synthetic `lldp:{local_port}` key for an AP
    /// with no usable mgmt address).
    ///
    /// Model-preservation rule: a later observation lacking a model never
    /// overwrites a previously learned model.
    pub fn observe_neighbor(
        &mut self,
        local_switch_ip: &str,
        local_port: &str,
        neighbor: Neighbor,
        classified_as: DeviceType,
        now: u64,
    ) -> Option<String> {
        let mut created_key = None;

        if let Some(sw) = self.devices.get_mut(local_switch_ip) {
            sw.neighbors.insert(local_port.to_owned(), neighbor.clone());
            sw.last_seen = now;
        }

        match classified_as {
            DeviceType::Ap => {
                let ap_ip = neighbor
                    .remote_mgmt_ip
                    .clone()
                    .unwrap_or_else(|| format!("lldp:{}", local_port));

                if !self.devices.contains_key(&ap_ip) {
                    self.devices.insert(ap_ip.clone(), Device::new_ap(&ap_ip, now));
                    created_key = Some(ap_ip.clone());
                }

                if let Some(ap) = self.devices.get_mut(&ap_ip) {
                    ap.last_seen = now;
                    ap.connected_switch = Some(local_switch_ip.to_owned());
                    ap.connected_port = Some(local_port.to_owned());
                    if ap.model.is_none() {
                        if let Some(model) = parse_ap_model(&neighbor.remote_system_description) {
                            ap.model = Some(model);
                        }
                    }
                    if ap.hostname.is_none() && !neighbor.remote_system_name.is_empty() {
                        ap.hostname = Some(neighbor.remote_system_name.clone());
                    }
                    if ap.mac.is_none() {
                        ap.mac = neighbor.remote_chassis_mac.clone();
                    }
                }

                if let Some(sw) = self.devices.get_mut(local_switch_ip) {
                    sw.ap_ports.insert(local_port.to_owned());
                }
            }
            DeviceType::Switch => {
                if let Some(mgmt_ip) = neighbor.remote_mgmt_ip.clone() {
                    if mgmt_ip != "0.0.0.0" && !self.devices.contains_key(&mgmt_ip) {
                        self.devices.insert(mgmt_ip.clone(), Device::new_switch(&mgmt_ip, false, now));
                        created_key = Some(mgmt_ip.clone());
                    }
                    if let Some(neighbor_sw) = self.devices.get_mut(&mgmt_ip) {
                        if neighbor_sw.model.is_none() {
                            if let Some(model) = parse_switch_model(&neighbor.remote_system_description) {
                                neighbor_sw.model = Some(model);
                            }
                        }
                        if neighbor_sw.mac.is_none() {
                            neighbor_sw.mac = neighbor.remote_chassis_mac.clone();
                        }
                        if neighbor_sw.hostname.is_none() && !neighbor.remote_system_name.is_empty() {
                            neighbor_sw.hostname = Some(neighbor.remote_system_name.clone());
                        }
                    }
                }
            }
        }

        created_key
    }

    /// Register a switch neighbor discovered by L2 trace when LLDP's
    /// management-address field was unusable (e.g. `0.0.0.0`).
    pub fn observe_l2_trace_hop(&mut self, ip: &str, mac: &str, now: u64) -> bool {
        if ip == "0.0.0.0" || ip.is_empty() {
            return false;
        }
        let created = !self.devices.contains_key(ip);
        let entry = self
            .devices
            .entry(ip.to_owned())
            .or_insert_with(|| Device::new_switch(ip, false, now));
        entry.last_seen = now;
        if entry.mac.is_none() {
            entry.mac = Some(mac.to_owned());
        }
        created
    }

    /// Transition a device's status, enforcing the state machine in §4.3,
    /// and append a task tag to the appropriate ledger.
    pub fn transition(
        &mut self,
        ip: &str,
        new_status: DeviceStatus,
        task_tag: Option<&str>,
        now: u64,
    ) -> Result<(), String> {
        let device = self.devices.get_mut(ip).ok_or_else(|| format!("unknown device {ip}"))?;

        let allowed = matches!(
            (device.status, new_status),
            (DeviceStatus::Discovered, DeviceStatus::Connecting)
                | (DeviceStatus::Connecting, DeviceStatus::Configuring)
                | (DeviceStatus::Connecting, DeviceStatus::Error)
                | (DeviceStatus::Configuring, DeviceStatus::Configured)
                | (DeviceStatus::Configuring, DeviceStatus::Error)
                | (DeviceStatus::Configured, DeviceStatus::Error)
                | (DeviceStatus::Error, DeviceStatus::Connecting)
                | (DeviceStatus::Discovered, DeviceStatus::Error)
        ) || device.status == new_status;

        if !allowed {
            return Err(format!("illegal transition {:?} -> {:?} for {ip}", device.status, new_status));
        }

        device.status = new_status;
        device.last_seen = now;
        if let Some(tag) = task_tag {
            match new_status {
                DeviceStatus::Error => device.tasks_failed.push(tag.to_owned()),
                _ => device.tasks_completed.push(tag.to_owned()),
            }
        }
        Ok(())
    }

    /// Immutable deep copy for transport (dashboard shadow, RPC handlers).
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }
}

fn parse_ap_model(system_description: &str) -> Option<String> {
    // e.g. "Ruckus R350 Multimedia Hotzone Wireless AP"
    let marker = "Ruckus ";
    let idx = system_description.find(marker)?;
    let rest = &system_description[idx + marker.len()..];
    rest.split_whitespace().next().map(|m| m.to_owned())
}

fn parse_switch_model(system_description: &str) -> Option<String> {
    system_description
        .split_whitespace()
        .find(|tok| tok.starts_with("ICX"))
        .map(|m| m.to_owned())
}

/// Classify an LLDP neighbor as switch or AP from its system-description,
/// per the vendor AP marker (design §4.2 / C2).
pub fn classify_neighbor(system_description: &str) -> DeviceType {
    if system_description.contains("Wireless AP") || system_description.contains("Access Point") {
        DeviceType::Ap
    } else {
        DeviceType::Switch
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
