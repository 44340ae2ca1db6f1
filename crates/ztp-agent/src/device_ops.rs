// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed device operations over a [`SwitchSession`] (design §4.2 / C2).
//!
//! Each function is a thin wrapper: it sends a CLI command, then parses the
//! response into a typed structure. Parsing is a pure function of the raw
//! text and is unit-tested independently of any live session. None of these
//! functions touch the Inventory directly — callers (the engine) own that.

use std::time::Duration;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::AgentError;
use crate::inventory::{DeviceType, Neighbor};
use crate::ssh::SwitchSession;

/// Parsed `show version` identity fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub model: String,
    pub serial: String,
    pub firmware: String,
    pub uptime: String,
}

/// Port VLAN assignment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlanMode {
    Access,
    TrunkNative,
}

/// Run `show version` and parse the vendor ICX family line plus serial,
/// firmware, and uptime fields. Tolerant of extra whitespace and
/// version-tag variation (design §4.2).
pub async fn discover_identity(
    session: &mut SwitchSession,
    timeout: Duration,
) -> Result<Identity, AgentError> {
    let (out, ok) = session.run("show version", timeout).await?;
    if !ok {
        return Err(AgentError::protocol("show version did not return"));
    }
    parse_identity(&out)
}

fn parse_identity(text: &str) -> Result<Identity, AgentError> {
    let model_re = Regex::new(r"(?i)\b(ICX\S*)\b").map_err(|e| AgentError::parse(e.to_string()))?;
    let model = text
        .lines()
        .find_map(|line| model_re.captures(line).map(|c| c[1].to_owned()))
        .ok_or_else(|| AgentError::parse("no ICX model line in show version output"))?;

    let serial = find_field(text, &["Serial#", "Serial"]).unwrap_or_default();
    let firmware =
        find_field(text, &["SW: Version", "Software Version", "Version"]).unwrap_or_default();
    let uptime = find_field(text, &["Uptime", "up time", "System uptime"]).unwrap_or_default();

    Ok(Identity { model, serial, firmware, uptime })
}

/// Look for a `Field ...: value` or `Field value` style line, tolerant of
/// whitespace runs, and return the trailing value.
fn find_field(text: &str, labels: &[&str]) -> Option<String> {
    for line in text.lines() {
        let trimmed = line.trim();
        for label in labels {
            if let Some(rest) = trimmed.strip_prefix(label) {
                let rest = rest.trim_start_matches([':', ' ', '\t']);
                if !rest.is_empty() {
                    return Some(rest.trim().to_owned());
                }
            }
        }
    }
    None
}

/// Classify an LLDP neighbor's system-description into switch or AP, per
/// the vendor AP marker (design §4.2).
pub fn classify_lldp_neighbor(system_description: &str) -> DeviceType {
    crate::inventory::classify_neighbor(system_description)
}

/// Run `show lldp neighbors` to discover local ports with a neighbor, then
/// `show lldp neighbors detail ports ethernet <port>` for each, returning a
/// mapping local port id -> (classified type, normalized neighbor record).
pub async fn lldp_neighbors(
    session: &mut SwitchSession,
    timeout: Duration,
) -> Result<IndexMap<String, (DeviceType, Neighbor)>, AgentError> {
    let (summary, ok) = session.run("show lldp neighbors", timeout).await?;
    if !ok {
        return Err(AgentError::protocol("show lldp neighbors did not return"));
    }
    let ports = parse_lldp_summary_ports(&summary);

    let mut result = IndexMap::new();
    for port in ports {
        let cmd = format!("show lldp neighbors detail ports ethernet {port}");
        let (detail, ok) = session.run(&cmd, timeout).await?;
        if !ok {
            continue;
        }
        if let Some(neighbor) = parse_lldp_detail(&detail) {
            let kind = classify_lldp_neighbor(&neighbor.remote_system_description);
            result.insert(port, (kind, neighbor));
        }
    }
    Ok(result)
}

/// Parse the local port column out of `show lldp neighbors` summary output.
/// Lines look like: `1/1/4    38:45:3b:3c:db:36   1/1/4   r350-1   120`.
fn parse_lldp_summary_ports(text: &str) -> Vec<String> {
    let port_re = Regex::new(r"^\s*(\d+/\d+/\d+)\s").unwrap_or_else(|_| Regex::new("$^").unwrap());
    text.lines()
        .filter_map(|line| port_re.captures(line).map(|c| c[1].to_owned()))
        .collect()
}

/// Parse `show lldp neighbors detail ports ethernet <port>` output into a
/// normalized [`Neighbor`]. Management address `0.0.0.0` is treated as
/// "not advertised" (design §8 boundary behavior), not a real IP.
fn parse_lldp_detail(text: &str) -> Option<Neighbor> {
    let chassis_mac = find_field(text, &["Chassis id", "Chassis ID"])
        .map(|v| normalize_mac(&v))
        .filter(|m| !m.is_empty());
    let port_id = find_field(text, &["Port id", "Port ID"]).unwrap_or_default();
    let system_name = find_field(text, &["System name"]).unwrap_or_default();
    let system_description = find_field(text, &["System description"]).unwrap_or_default();
    let mgmt_ip = find_field(text, &["Management address (IPv4)", "Management address"])
        .filter(|ip| ip != "0.0.0.0" && !ip.is_empty());

    if port_id.is_empty() && system_description.is_empty() {
        return None;
    }

    Some(Neighbor {
        remote_chassis_mac: chassis_mac,
        remote_port_id: port_id,
        remote_system_name: system_name,
        remote_system_description: system_description,
        remote_mgmt_ip: mgmt_ip,
    })
}

/// Normalize a MAC address to lowercase colon-hex, accepting vendor
/// dot-separated (`3845.3b3c.db36`) or colon-separated input.
pub fn normalize_mac(raw: &str) -> String {
    let hex: String = raw.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() != 12 {
        return raw.trim().to_ascii_lowercase();
    }
    let hex = hex.to_ascii_lowercase();
    hex.as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(":")
}

/// One hop recovered from `trace-l2 show` multi-path output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Hop {
    pub ip: String,
    pub mac: String,
}

/// Run `trace-l2 show` and parse its multi-path table to recover
/// switch-to-switch IP/MAC for neighbors that did not advertise a
/// management IP via LLDP (design §4.2, §8 scenario 2).
pub async fn l2_trace(
    session: &mut SwitchSession,
    timeout: Duration,
) -> Result<Vec<L2Hop>, AgentError> {
    let (out, ok) = session.run("trace-l2 show", timeout).await?;
    if !ok {
        return Err(AgentError::protocol("trace-l2 show did not return"));
    }
    Ok(parse_l2_trace(&out))
}

/// Hop lines look like: `1    172.16.128.16   3845.3b3c.db36`.
fn parse_l2_trace(text: &str) -> Vec<L2Hop> {
    let hop_re = Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3})\s+([0-9a-fA-F.:]{12,17})")
        .unwrap_or_else(|_| Regex::new("$^").unwrap());
    text.lines()
        .filter_map(|line| {
            hop_re.captures(line).map(|c| L2Hop { ip: c[1].to_owned(), mac: normalize_mac(&c[2]) })
        })
        .filter(|hop| hop.ip != "0.0.0.0")
        .collect()
}

/// Program a switch port's VLAN membership. Wraps `enter_config`/
/// `exit_config`'s discipline: enters interface context, issues the VLAN
/// command, exits cleanly even on error.
pub async fn set_port_vlan(
    session: &mut SwitchSession,
    port: &str,
    vlan: u16,
    mode: VlanMode,
    timeout: Duration,
) -> Result<(), AgentError> {
    session.enter_config(timeout).await?;
    let result = async {
        let (_out, ok) = session.run(&format!("vlan {vlan}"), timeout).await?;
        if !ok {
            return Err(AgentError::protocol(format!("vlan {vlan} not accepted")));
        }
        let member_cmd = match mode {
            VlanMode::Access => format!("untagged ethernet {port}"),
            VlanMode::TrunkNative => format!("tagged ethernet {port}"),
        };
        let (_out, ok) = session.run(&member_cmd, timeout).await?;
        if !ok {
            return Err(AgentError::protocol(format!("{member_cmd} not accepted")));
        }
        Ok(())
    }
    .await;
    session.exit_config(timeout).await?;
    result
}

/// Toggle PoE on a switch port.
pub async fn set_poe(
    session: &mut SwitchSession,
    port: &str,
    on: bool,
    timeout: Duration,
) -> Result<(), AgentError> {
    session.enter_config(timeout).await?;
    let result = async {
        let (_out, iface_ok) =
            session.run(&format!("interface ethernet {port}"), timeout).await?;
        if !iface_ok {
            return Err(AgentError::protocol(format!("interface ethernet {port} not accepted")));
        }
        let cmd = if on { "inline power" } else { "no inline power" };
        let (_out, ok) = session.run(cmd, timeout).await?;
        if !ok {
            return Err(AgentError::protocol(format!("{cmd} not accepted on {port}")));
        }
        Ok(())
    }
    .await;
    session.exit_config(timeout).await?;
    result
}

/// Set a switch port's administrative description.
pub async fn set_port_description(
    session: &mut SwitchSession,
    port: &str,
    text: &str,
    timeout: Duration,
) -> Result<(), AgentError> {
    session.enter_config(timeout).await?;
    let result = async {
        let (_out, iface_ok) =
            session.run(&format!("interface ethernet {port}"), timeout).await?;
        if !iface_ok {
            return Err(AgentError::protocol(format!("interface ethernet {port} not accepted")));
        }
        let (_out, ok) = session.run(&format!("port-name {text}"), timeout).await?;
        if !ok {
            return Err(AgentError::protocol(format!("port-name not accepted on {port}")));
        }
        Ok(())
    }
    .await;
    session.exit_config(timeout).await?;
    result
}

/// Set a switch port's administrative (up/down) state.
pub async fn set_port_admin(
    session: &mut SwitchSession,
    port: &str,
    up: bool,
    timeout: Duration,
) -> Result<(), AgentError> {
    session.enter_config(timeout).await?;
    let result = async {
        let (_out, iface_ok) =
            session.run(&format!("interface ethernet {port}"), timeout).await?;
        if !iface_ok {
            return Err(AgentError::protocol(format!("interface ethernet {port} not accepted")));
        }
        let cmd = if up { "enable" } else { "disable" };
        let (_out, ok) = session.run(cmd, timeout).await?;
        if !ok {
            return Err(AgentError::protocol(format!("{cmd} not accepted on {port}")));
        }
        Ok(())
    }
    .await;
    session.exit_config(timeout).await?;
    result
}

#[cfg(test)]
#[path = "device_ops_tests.rs"]
mod tests;
