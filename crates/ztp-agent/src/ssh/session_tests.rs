// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Spawn a fake device task on one end of a duplex stream, returning the
/// other end wrapped in an `InteractiveShell`. The fake device echoes a
/// scripted reply whenever it sees a line matching `expect_contains`.
fn fake_device(
    script: Vec<(&'static str, &'static str)>,
) -> InteractiveShell<tokio::io::DuplexStream> {
    fake_device_with_preamble("", script)
}

/// Like [`fake_device`] but writes `preamble` immediately before waiting on
/// the scripted exchange, for flows that read a banner before sending.
fn fake_device_with_preamble(
    preamble: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> InteractiveShell<tokio::io::DuplexStream> {
    let (client, mut device) = tokio::io::duplex(8192);
    tokio::spawn(async move {
        if !preamble.is_empty() {
            if device.write_all(preamble.as_bytes()).await.is_err() {
                return;
            }
        }
        for (expect, reply) in script {
            let mut buf = [0u8; 4096];
            let mut seen = String::new();
            loop {
                let n = match device.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                seen.push_str(&String::from_utf8_lossy(&buf[..n]));
                if seen.contains(expect) {
                    break;
                }
            }
            if device.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    });
    InteractiveShell::new(client)
}

#[tokio::test]
async fn run_strips_prompt_and_returns_output() {
    let mut shell = fake_device(vec![("show version", "ICX7150 firmware 1.0\nSSH@ICX7150#")]);
    let (out, ok) = shell.run("show version", Duration::from_secs(2)).await.unwrap();
    assert!(ok);
    assert!(out.contains("ICX7150 firmware 1.0"));
}

#[tokio::test]
async fn run_pages_through_more_marker() {
    let mut shell = fake_device(vec![
        ("show run", "line one\n--More--"),
        (" ", "line two\nSSH@ICX7150#"),
    ]);
    let (out, ok) = shell.run("show run", Duration::from_secs(2)).await.unwrap();
    assert!(ok);
    assert!(out.contains("line one"));
    assert!(out.contains("line two"));
    assert!(!out.contains("--More--"));
}

#[tokio::test]
async fn enter_config_reaches_config_prompt() {
    let mut shell = fake_device(vec![("configure terminal", "SSH@ICX7150(config)#")]);
    shell.enter_config(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn save_requires_confirmation_text() {
    let mut shell = fake_device(vec![("write memory", "Write startup-config done.\nSSH@ICX7150#")]);
    let ok = shell.save(Duration::from_secs(2)).await.unwrap();
    assert!(ok);
}

#[tokio::test]
async fn run_times_out_when_no_prompt_appears() {
    let (client, _device) = tokio::io::duplex(64);
    let mut shell = InteractiveShell::new(client);
    let result = shell.run("show version", Duration::from_millis(50)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn ssh_active_clears_after_run_completes() {
    let mut shell = fake_device(vec![("show version", "SSH@ICX7150#")]);
    assert!(!shell.ssh_active);
    shell.run("show version", Duration::from_secs(2)).await.unwrap();
    assert!(!shell.ssh_active);
}

#[tokio::test]
async fn maybe_change_password_detects_forced_prompt() {
    let mut shell =
        fake_device_with_preamble("Enter new password:", vec![("admin123", "SSH@ICX7150#")]);
    let changed = shell.maybe_change_password("admin123", Duration::from_secs(2)).await.unwrap();
    assert!(changed);
}

#[tokio::test]
async fn maybe_change_password_is_noop_at_normal_prompt() {
    let mut shell = fake_device_with_preamble("SSH@ICX7150#", vec![]);
    let changed = shell.maybe_change_password("admin123", Duration::from_secs(2)).await.unwrap();
    assert!(!changed);
}
