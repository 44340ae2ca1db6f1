// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration: CLI flags (with env fallback) layered over an
//! INI-like config file (design §6). The file is read once at startup and
//! re-read only on SIGHUP; no other ecosystem crate in this workspace's
//! pack parses this particular text format, so the loader is hand-rolled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::error::AgentError;

#[derive(Debug, Parser, Clone)]
#[command(name = "ztp-agent", version)]
pub struct Cli {
    /// Path to the INI-like agent configuration file.
    #[arg(long, env = "ZTP_AGENT_CONFIG", default_value = "/etc/ztp-agent/agent.conf")]
    pub config_path: PathBuf,

    /// Override the agent id from the config file.
    #[arg(long, env = "ZTP_AGENT_ID")]
    pub agent_id: Option<String>,

    /// Override the dashboard server URL from the config file.
    #[arg(long, env = "ZTP_SERVER_URL")]
    pub server_url: Option<String>,

    /// Log format: "json" or "text".
    #[arg(long, env = "ZTP_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

/// Fully resolved agent configuration, merging file and CLI/env overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub agent_id: String,
    pub auth_token: String,
    pub command_timeout_ms: u64,

    pub hostname: String,
    pub subnet: String,

    pub server_url: String,
    pub websocket_path: String,
    pub reconnect_interval_ms: u64,

    pub log_level: String,
    pub log_file: Option<PathBuf>,

    pub enable_ztp: bool,
    pub poll_interval_ms: u64,
}

impl AgentConfig {
    /// Load and validate configuration from `path`, then apply CLI overrides.
    pub fn load(path: &Path, cli: &Cli) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::config(format!("reading {}: {e}", path.display())))?;
        let ini = parse_ini(&text)?;
        Self::from_ini(&ini, cli)
    }

    fn from_ini(ini: &Ini, cli: &Cli) -> Result<Self, AgentError> {
        let agent = ini.section("agent");
        let network = ini.section("network");
        let backend = ini.section("backend");
        let logging = ini.section("logging");
        let ztp = ini.section("ztp");

        let agent_id = cli
            .agent_id
            .clone()
            .or_else(|| agent.get("agent_id").cloned())
            .ok_or_else(|| AgentError::config("[agent] agent_id is required"))?;

        let auth_token = agent
            .get("auth_token")
            .cloned()
            .ok_or_else(|| AgentError::config("[agent] auth_token is required"))?;

        let command_timeout_ms = agent
            .get("command_timeout")
            .map(|v| parse_u64(v, "agent.command_timeout"))
            .transpose()?
            .unwrap_or(30_000);

        let hostname = network
            .get("hostname")
            .cloned()
            .unwrap_or_else(|| "unknown".to_owned());
        let subnet = network.get("subnet").cloned().unwrap_or_default();

        let server_url = cli
            .server_url
            .clone()
            .or_else(|| backend.get("server_url").cloned())
            .ok_or_else(|| AgentError::config("[backend] server_url is required"))?;
        let websocket_path = backend
            .get("websocket_path")
            .cloned()
            .unwrap_or_else(|| "/ws/agent".to_owned());
        let reconnect_interval_ms = backend
            .get("reconnect_interval")
            .map(|v| parse_u64(v, "backend.reconnect_interval"))
            .transpose()?
            .unwrap_or(30_000);

        let log_level = logging.get("level").cloned().unwrap_or_else(|| "info".to_owned());
        let log_file = logging.get("log_file").map(PathBuf::from);

        let enable_ztp = ztp
            .get("enable_ztp")
            .map(|v| parse_bool(v, "ztp.enable_ztp"))
            .transpose()?
            .unwrap_or(true);
        let poll_interval_ms = ztp
            .get("poll_interval")
            .map(|v| parse_u64(v, "ztp.poll_interval"))
            .transpose()?
            .unwrap_or(10_000);

        Ok(Self {
            agent_id,
            auth_token,
            command_timeout_ms,
            hostname,
            subnet,
            server_url,
            websocket_path,
            reconnect_interval_ms,
            log_level,
            log_file,
            enable_ztp,
            poll_interval_ms,
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn websocket_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        format!("{base}{}", self.websocket_path)
    }
}

fn parse_u64(raw: &str, field: &str) -> Result<u64, AgentError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AgentError::config(format!("{field}: invalid integer {raw:?}")))
}

fn parse_bool(raw: &str, field: &str) -> Result<bool, AgentError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::config(format!("{field}: invalid boolean {raw:?}"))),
    }
}

/// A parsed INI-like document: section name -> key -> value. Keys outside
/// any section are rejected; comments start with `;` or `#`.
struct Ini {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Ini {
    fn section(&self, name: &str) -> SectionView<'_> {
        SectionView(self.sections.get(name))
    }
}

struct SectionView<'a>(Option<&'a HashMap<String, String>>);

impl<'a> SectionView<'a> {
    fn get(&self, key: &str) -> Option<&'a String> {
        self.0.and_then(|m| m.get(key))
    }
}

fn parse_ini(text: &str) -> Result<Ini, AgentError> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[') {
            let name = stripped
                .strip_suffix(']')
                .ok_or_else(|| AgentError::config(format!("line {}: malformed section header", lineno + 1)))?
                .trim()
                .to_owned();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let section = current.as_ref().ok_or_else(|| {
            AgentError::config(format!("line {}: key outside any [section]", lineno + 1))
        })?;
        let (key, value) = line.split_once('=').ok_or_else(|| {
            AgentError::config(format!("line {}: expected key = value", lineno + 1))
        })?;
        sections
            .entry(section.clone())
            .or_default()
            .insert(key.trim().to_owned(), value.trim().to_owned());
    }

    Ok(Ini { sections })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
