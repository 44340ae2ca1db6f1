// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the ztp-dashboard aggregator (design §6 expansion).
///
/// Unlike the agent, the dashboard has no file-backed configuration
/// section — CLI flags with `env` fallbacks are the whole surface.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "ztp-dashboard", version, about = "ZTP fleet dashboard aggregator")]
pub struct DashboardConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "ZTP_DASHBOARD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8900, env = "ZTP_DASHBOARD_PORT")]
    pub port: u16,

    /// Expected interval between agent heartbeats, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "ZTP_DASHBOARD_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,

    /// An agent is marked offline after missing heartbeats for this many
    /// multiples of `heartbeat_interval_ms` (design §4.6).
    #[arg(long, default_value_t = 3, env = "ZTP_DASHBOARD_HEARTBEAT_TIMEOUT_MULTIPLIER")]
    pub heartbeat_timeout_multiplier: u32,

    /// Event log ring buffer capacity (design §4.7).
    #[arg(long, default_value_t = 1000, env = "ZTP_DASHBOARD_EVENT_LOG_CAPACITY")]
    pub event_log_capacity: usize,

    /// Default timeout for an `rpc_call` when the caller does not supply one.
    #[arg(long, default_value_t = 60_000, env = "ZTP_DASHBOARD_RPC_DEFAULT_TIMEOUT_MS")]
    pub rpc_default_timeout_ms: u64,

    /// Maximum inbound `event` frames accepted per agent per minute before
    /// the excess is dropped with a logged warning (design §4.6).
    #[arg(long, default_value_t = 30, env = "ZTP_DASHBOARD_EVENT_RATE_LIMIT_PER_MINUTE")]
    pub event_rate_limit_per_minute: u32,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text", env = "ZTP_DASHBOARD_LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter (used unless RUST_LOG is set).
    #[arg(long, default_value = "info", env = "ZTP_DASHBOARD_LOG_LEVEL")]
    pub log_level: String,

    /// HMAC signing key for per-agent session cookies (design §4.8 expansion).
    /// If unset, a random key is generated at startup — sessions will not
    /// survive a restart, which matches the in-memory, no-persistence
    /// non-goal.
    #[arg(long, env = "ZTP_DASHBOARD_COOKIE_SECRET")]
    pub cookie_secret: Option<String>,

    /// Shared bearer token required of every agent WebSocket upgrade
    /// (design §4.5: "a bearer token in the upgrade headers"). If unset,
    /// agent ingestion auth is disabled — matching the teacher's
    /// `auth_token: Option<String>` convention of "unset disables auth".
    #[arg(long, env = "ZTP_DASHBOARD_AGENT_AUTH_TOKEN")]
    pub agent_auth_token: Option<String>,
}

impl DashboardConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        self.heartbeat_interval() * self.heartbeat_timeout_multiplier
    }

    pub fn rpc_default_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rpc_default_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
