// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end dashboard smoke tests.
//!
//! Spawns the real `ztp-dashboard` binary as a subprocess and drives it
//! over HTTP and WebSocket, standing in for an edge agent with a raw
//! `tokio-tungstenite` client rather than spawning a real `ztp-agent`
//! (which would need a live switch to talk to over SSH).

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve the path to the compiled `ztp-dashboard` binary.
pub fn dashboard_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/e2e -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("ztp-dashboard")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `ztp-dashboard` process that is killed on drop.
pub struct DashboardProcess {
    child: Child,
    port: u16,
    auth_token: Option<String>,
}

impl DashboardProcess {
    /// Spawn the dashboard on a free port, optionally requiring `auth_token`
    /// on inbound agent WebSocket upgrades.
    pub fn start(auth_token: Option<&str>) -> anyhow::Result<Self> {
        let binary = dashboard_binary();
        anyhow::ensure!(binary.exists(), "ztp-dashboard binary not found at {}", binary.display());

        let port = free_port()?;
        let mut args = vec![
            "--host".to_owned(),
            "127.0.0.1".to_owned(),
            "--port".to_owned(),
            port.to_string(),
            "--log-format".to_owned(),
            "text".to_owned(),
            "--log-level".to_owned(),
            "warn".to_owned(),
        ];
        if let Some(token) = auth_token {
            args.extend(["--agent-auth-token".to_owned(), token.to_owned()]);
        }

        let child = Command::new(&binary).args(&args).stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;

        Ok(Self { child, port, auth_token: auth_token.map(str::to_owned) })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, agent_id: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/agent/{agent_id}", self.port)
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Poll `/api/v1/health` until it responds successfully.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("ztp-dashboard did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for DashboardProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub type AgentSocket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Dial the dashboard's agent WebSocket endpoint and send a `register`
/// frame, returning the open socket for further interaction.
pub async fn connect_and_register(
    dashboard: &DashboardProcess,
    agent_id: &str,
    hostname: &str,
) -> anyhow::Result<AgentSocket> {
    let mut request = dashboard.ws_url(agent_id).into_client_request()?;
    if let Some(token) = dashboard.auth_token() {
        request.headers_mut().insert("authorization", format!("Bearer {token}").parse()?);
    }

    let (mut socket, _) = tokio_tungstenite::connect_async(request).await?;
    let register = serde_json::json!({
        "type": "register",
        "timestamp": "2026-01-01T00:00:00.000Z",
        "agent_id": agent_id,
        "hostname": hostname,
        "subnet": "10.0.0.0/24",
        "version": "0.1.0",
        "capabilities": ["ztp"],
    });
    socket.send(Message::Text(register.to_string().into())).await?;
    Ok(socket)
}

/// Read the next text frame from an agent socket, parsed as JSON.
pub async fn recv_json(socket: &mut AgentSocket) -> anyhow::Result<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, socket.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("agent websocket stream ended"))??;
        if let Message::Text(text) = msg {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}
