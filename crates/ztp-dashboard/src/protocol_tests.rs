// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn register_frame_round_trips() {
    let frame = AgentFrame::Register {
        timestamp: "2026-07-28T00:00:00.000Z".to_owned(),
        agent_id: "site-1".to_owned(),
        hostname: "h".to_owned(),
        subnet: "10.0.0.0/24".to_owned(),
        version: "0.11.25".to_owned(),
        capabilities: vec!["ztp".to_owned()],
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains("\"type\":\"register\""));
    let back = parse_agent_frame(&json).unwrap();
    assert!(matches!(back, AgentFrame::Register { agent_id, .. } if agent_id == "site-1"));
}

#[test]
fn unknown_frame_type_does_not_error() {
    let raw = r#"{"type":"future_frame","timestamp":"2026-01-01T00:00:00.000Z"}"#;
    let parsed = parse_agent_frame(raw).unwrap();
    assert!(matches!(parsed, AgentFrame::Unknown));
}

#[test]
fn malformed_json_is_still_an_error() {
    assert!(parse_agent_frame("{not json").is_err());
}

#[test]
fn rpc_call_frame_serializes_with_tag() {
    let frame = DashboardFrame::RpcCall {
        timestamp: "2026-01-01T00:00:00.000Z".to_owned(),
        request_id: "abc".to_owned(),
        op: "run_show".to_owned(),
        args: serde_json::json!({"target_ip": "10.0.0.5"}),
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains("\"type\":\"rpc_call\""));
}

#[test]
fn control_action_serializes_lowercase() {
    let json = serde_json::to_string(&ControlAction::Start).unwrap();
    assert_eq!(json, "\"start\"");
}
