// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand CLI command RPC dispatch (design §4.9 / C9, agent side).
//!
//! Each `rpc_call` opens its own short-lived [`SwitchSession`] against
//! `args.target_ip` — it never touches the engine's `Inventory` and never
//! shares a session with the tick loop. If the engine currently holds a
//! live session to the same IP, dispatch fails fast with `Busy` rather
//! than risking interleaved commands on one CLI (design §5).

use std::time::Duration;

use serde_json::{json, Value};

use crate::device_ops::{self, VlanMode};
use crate::engine::EngineHandle;
use crate::error::{AgentError, ErrorKind};
use crate::ssh::{Credential, SwitchSession};

const DEFAULT_PORT: u16 = 22;

/// Recognized RPC `op` values (design note, §9 open-question resolution).
/// Unknown ops return `ParseError`, never silently succeed.
pub async fn dispatch(
    handle: &EngineHandle,
    op: &str,
    args: &Value,
    timeout: Duration,
) -> Result<Value, AgentError> {
    let target_ip = args
        .get("target_ip")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.target_ip is required"))?;

    if handle.is_busy(target_ip).await {
        return Err(AgentError::busy(format!("engine holds a session to {target_ip}")));
    }

    match op {
        "run_show" => run_show(target_ip, args, timeout).await,
        "port_status" => port_status(target_ip, args, timeout).await,
        "set_vlan" => set_vlan(target_ip, args, timeout).await,
        "set_poe" => set_poe(target_ip, args, timeout).await,
        other => Err(AgentError::new(ErrorKind::ParseError, format!("unrecognized rpc op {other:?}"))),
    }
}

fn credential_from(args: &Value) -> Result<Credential, AgentError> {
    let username = args
        .get("username")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.username is required"))?
        .to_owned();
    let password = args
        .get("password")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.password is required"))?
        .to_owned();
    Ok(Credential { username, password })
}

async fn open(target_ip: &str, args: &Value, timeout: Duration) -> Result<SwitchSession, AgentError> {
    let cred = credential_from(args)?;
    let (session, _outcome) =
        SwitchSession::open(target_ip, DEFAULT_PORT, &[cred.clone()], &cred.password, timeout).await?;
    Ok(session)
}

async fn run_show(target_ip: &str, args: &Value, timeout: Duration) -> Result<Value, AgentError> {
    let command = args
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.command is required"))?;
    let mut session = open(target_ip, args, timeout).await?;
    let result = session.run(command, timeout).await;
    session.close().await;
    let (output, ok) = result?;
    Ok(json!({"ok": ok, "output": output}))
}

async fn port_status(target_ip: &str, args: &Value, timeout: Duration) -> Result<Value, AgentError> {
    let port = args
        .get("port")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.port is required"))?;
    let mut session = open(target_ip, args, timeout).await?;
    let result = session.run(&format!("show interfaces ethernet {port}"), timeout).await;
    session.close().await;
    let (output, ok) = result?;
    Ok(json!({"ok": ok, "output": output}))
}

async fn set_vlan(target_ip: &str, args: &Value, timeout: Duration) -> Result<Value, AgentError> {
    let port = args
        .get("port")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.port is required"))?;
    let vlan = args
        .get("vlan")
        .and_then(Value::as_u64)
        .ok_or_else(|| AgentError::parse("args.vlan is required"))? as u16;
    let mode = match args.get("mode").and_then(Value::as_str) {
        Some("trunk-native") => VlanMode::TrunkNative,
        _ => VlanMode::Access,
    };
    let mut session = open(target_ip, args, timeout).await?;
    let result = device_ops::set_port_vlan(&mut session, port, vlan, mode, timeout).await;
    session.close().await;
    result?;
    Ok(json!({"ok": true}))
}

async fn set_poe(target_ip: &str, args: &Value, timeout: Duration) -> Result<Value, AgentError> {
    let port = args
        .get("port")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::parse("args.port is required"))?;
    let on = args.get("on").and_then(Value::as_bool).unwrap_or(false);
    let mut session = open(target_ip, args, timeout).await?;
    let result = device_ops::set_poe(&mut session, port, on, timeout).await;
    session.close().await;
    result?;
    Ok(json!({"ok": true}))
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
