// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str = r#"
; sample agent config
[agent]
agent_id = site-42
auth_token = super-secret
command_timeout = 45000

[network]
hostname = agent-site-42
subnet = 192.168.1.0/24

[backend]
server_url = https://dashboard.example.test
websocket_path = /ws/agent
reconnect_interval = 15000

[logging]
level = debug

[ztp]
enable_ztp = true
poll_interval = 5000
"#;

fn cli() -> Cli {
    Cli {
        config_path: PathBuf::from("unused"),
        agent_id: None,
        server_url: None,
        log_format: "text".to_owned(),
    }
}

#[test]
fn parses_all_sections() {
    let ini = parse_ini(SAMPLE).unwrap();
    let cfg = AgentConfig::from_ini(&ini, &cli()).unwrap();
    assert_eq!(cfg.agent_id, "site-42");
    assert_eq!(cfg.auth_token, "super-secret");
    assert_eq!(cfg.command_timeout_ms, 45_000);
    assert_eq!(cfg.hostname, "agent-site-42");
    assert_eq!(cfg.subnet, "192.168.1.0/24");
    assert_eq!(cfg.server_url, "https://dashboard.example.test");
    assert_eq!(cfg.reconnect_interval_ms, 15_000);
    assert_eq!(cfg.log_level, "debug");
    assert!(cfg.enable_ztp);
    assert_eq!(cfg.poll_interval_ms, 5_000);
}

#[test]
fn cli_override_wins_over_file() {
    let ini = parse_ini(SAMPLE).unwrap();
    let mut c = cli();
    c.agent_id = Some("override-id".to_owned());
    c.server_url = Some("https://override.example.test".to_owned());
    let cfg = AgentConfig::from_ini(&ini, &c).unwrap();
    assert_eq!(cfg.agent_id, "override-id");
    assert_eq!(cfg.server_url, "https://override.example.test");
}

#[test]
fn missing_required_field_is_config_error() {
    let text = "[agent]\nauth_token = x\n";
    let ini = parse_ini(text).unwrap();
    let err = AgentConfig::from_ini(&ini, &cli()).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::ConfigError);
}

#[test]
fn key_outside_section_is_rejected() {
    let text = "agent_id = x\n";
    assert!(parse_ini(text).is_err());
}

#[test]
fn malformed_section_header_is_rejected() {
    let text = "[agent\nagent_id = x\n";
    assert!(parse_ini(text).is_err());
}

#[test]
fn invalid_boolean_is_config_error() {
    let text = "[agent]\nagent_id=a\nauth_token=b\n[backend]\nserver_url=u\n[ztp]\nenable_ztp=maybe\n";
    let ini = parse_ini(text).unwrap();
    assert!(AgentConfig::from_ini(&ini, &cli()).is_err());
}

#[test]
fn websocket_url_joins_base_and_path() {
    let ini = parse_ini(SAMPLE).unwrap();
    let cfg = AgentConfig::from_ini(&ini, &cli()).unwrap();
    assert_eq!(cfg.websocket_url(), "https://dashboard.example.test/ws/agent");
}
