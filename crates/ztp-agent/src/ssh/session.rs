// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The interactive switch session (design §4.1 / C1).
//!
//! The prompt-matching core (`InteractiveShell`) is generic over any
//! `AsyncRead + AsyncWrite` channel so it can be driven against an
//! in-memory duplex stream in tests; `SwitchSession` layers the real SSH2
//! transport (RFC 4254 `shell` request over an authenticated SSH2
//! connection, design §4.1 "Transport") on top of it.

use std::time::Duration;

use async_ssh2_lite::{AsyncChannel, AsyncSession, TokioTcpStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AgentError;
use crate::ssh::prompt::PromptState;

/// One `(username, password)` pair tried in order when opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Outcome of a successful `open`, recording whether the forced first-login
/// password change ran so the engine can persist the new credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOutcome {
    pub username: String,
    pub password_changed: bool,
}

const READ_CHUNK: usize = 4096;
const PAGE_CONTINUE: &str = " ";

/// Prompt-matching core, generic over the underlying channel so it can be
/// exercised in tests without a real SSH server (design §9: explicit state
/// machine, not ad-hoc string scanning inlined into `run`).
pub struct InteractiveShell<S> {
    io: S,
    pub ssh_active: bool,
}

impl<S> InteractiveShell<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: S) -> Self {
        Self { io, ssh_active: false }
    }

    /// Read chunks until a prompt classifies as "ready" (exec/enable/
    /// config/interface-config), transparently paging through `--More--`
    /// continuations. Returns the accumulated text with the final prompt
    /// line stripped, and the prompt state observed.
    async fn read_until_ready(
        &mut self,
        timeout: Duration,
    ) -> Result<(String, PromptState), AgentError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut acc = String::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(AgentError::timeout("no prompt observed before timeout"));
            }
            let n = match tokio::time::timeout(remaining, self.io.read(&mut buf)).await {
                Ok(Ok(0)) => return Err(AgentError::transient("channel closed mid-read")),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(AgentError::from(e)),
                Err(_) => return Err(AgentError::timeout("no prompt observed before timeout")),
            };
            acc.push_str(&String::from_utf8_lossy(&buf[..n]));

            match PromptState::classify(&acc) {
                Some(PromptState::Paged) => {
                    self.io
                        .write_all(PAGE_CONTINUE.as_bytes())
                        .await
                        .map_err(AgentError::from)?;
                    acc = acc.replace("--More--", "");
                }
                Some(state) if state.is_ready() => {
                    return Ok((strip_prompt_line(&acc), state));
                }
                Some(other) => return Ok((strip_prompt_line(&acc), other)),
                None => continue,
            }
        }
    }

    /// Send `cmd` and read until the prompt reappears. Sets `ssh_active`
    /// while blocked and clears it on any exit path (design §4.1).
    pub async fn run(&mut self, cmd: &str, timeout: Duration) -> Result<(String, bool), AgentError> {
        self.ssh_active = true;
        let result = self.run_inner(cmd, timeout).await;
        self.ssh_active = false;
        result
    }

    async fn run_inner(&mut self, cmd: &str, timeout: Duration) -> Result<(String, bool), AgentError> {
        let line = format!("{cmd}\n");
        self.io.write_all(line.as_bytes()).await.map_err(AgentError::from)?;
        match self.read_until_ready(timeout).await {
            Ok((output, _state)) => Ok((output, true)),
            Err(e) if e.kind.is_retryable() => Err(e),
            Err(e) => Ok((e.message, false)),
        }
    }

    /// Enter `(config)#` mode. Idempotent: a no-op if already there.
    pub async fn enter_config(&mut self, timeout: Duration) -> Result<(), AgentError> {
        let (_out, ok) = self.run("configure terminal", timeout).await?;
        if !ok {
            return Err(AgentError::protocol("failed to enter config mode"));
        }
        Ok(())
    }

    /// Exit any nested interface-config context back to enable mode.
    /// Prompt-suffix aware: issues `exit` until no longer in a config
    /// context, tolerating an already-exited session.
    pub async fn exit_config(&mut self, timeout: Duration) -> Result<(), AgentError> {
        for _ in 0..3 {
            let (out, _ok) = self.run("exit", timeout).await?;
            match PromptState::classify(&out) {
                Some(PromptState::Config) | Some(PromptState::InterfaceConfig) => continue,
                _ => return Ok(()),
            }
        }
        Ok(())
    }

    /// Issue the vendor "write memory" equivalent, returning ok only after
    /// the confirmation line is observed within timeout.
    pub async fn save(&mut self, timeout: Duration) -> Result<bool, AgentError> {
        let (out, ok) = self.run("write memory", timeout).await?;
        Ok(ok && !out.to_ascii_lowercase().contains("error"))
    }

    /// Drive the first-login forced password change, if the channel is
    /// currently sitting at a new-password prompt. Returns `true` if a
    /// change was performed.
    pub async fn maybe_change_password(
        &mut self,
        preferred_password: &str,
        timeout: Duration,
    ) -> Result<bool, AgentError> {
        let (_out, state) = self.read_until_ready(timeout).await?;
        if state != PromptState::NewPasswordPrompt {
            return Ok(false);
        }
        let line = format!("{preferred_password}\n");
        self.io.write_all(line.as_bytes()).await.map_err(AgentError::from)?;
        // Vendor flow re-prompts for confirmation.
        let (_out2, state2) = self.read_until_ready(timeout).await?;
        if state2 == PromptState::NewPasswordPrompt {
            self.io.write_all(line.as_bytes()).await.map_err(AgentError::from)?;
            self.read_until_ready(timeout).await?;
        }
        Ok(true)
    }
}

fn strip_prompt_line(text: &str) -> String {
    match text.rfind('\n') {
        Some(idx) => text[..idx].to_owned(),
        None => String::new(),
    }
}

/// Owns one interactive SSH channel to a single switch. Scoped acquisition:
/// `close()` (and `Drop`) release the underlying channel on every exit
/// path, including timeouts.
pub struct SwitchSession {
    pub ip: String,
    shell: InteractiveShell<AsyncChannel<TokioTcpStream>>,
    session: AsyncSession<TokioTcpStream>,
}

impl SwitchSession {
    /// Open a session against `ip`, trying each credential in
    /// `credential_list` in order. On a fresh device answering with the
    /// vendor default pair, detects the forced password-change prompt,
    /// sets `preferred_password`, and re-authenticates once with the new
    /// pair before returning.
    pub async fn open(
        ip: &str,
        port: u16,
        credential_list: &[Credential],
        preferred_password: &str,
        connect_timeout: Duration,
    ) -> Result<(Self, OpenOutcome), AgentError> {
        let mut last_err = AgentError::auth("no credentials supplied");

        for cred in credential_list {
            match Self::try_credential(ip, port, cred, preferred_password, connect_timeout).await {
                Ok((session, outcome)) => return Ok((session, outcome)),
                Err(e) if e.kind == crate::error::ErrorKind::TransientError => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn try_credential(
        ip: &str,
        port: u16,
        cred: &Credential,
        preferred_password: &str,
        timeout: Duration,
    ) -> Result<(Self, OpenOutcome), AgentError> {
        let addr = format!("{ip}:{port}");
        let stream = tokio::time::timeout(timeout, TokioTcpStream::connect(&addr))
            .await
            .map_err(|_| AgentError::transient(format!("connect to {ip} timed out")))?
            .map_err(|e| AgentError::transient(format!("connect to {ip}: {e}")))?;

        let mut session = AsyncSession::new(stream, None)
            .map_err(|e| AgentError::transient(format!("ssh session setup for {ip}: {e}")))?;
        session
            .handshake()
            .await
            .map_err(|e| AgentError::transient(format!("ssh handshake with {ip}: {e}")))?;

        session
            .userauth_password(&cred.username, &cred.password)
            .await
            .map_err(|e| AgentError::auth(format!("auth to {ip} as {}: {e}", cred.username)))?;
        if !session.authenticated() {
            return Err(AgentError::auth(format!("auth to {ip} as {} rejected", cred.username)));
        }

        let mut channel = session
            .channel_session()
            .await
            .map_err(|e| AgentError::protocol(format!("channel open on {ip}: {e}")))?;
        channel
            .request_pty("vt100", None, None)
            .await
            .map_err(|e| AgentError::protocol(format!("pty request on {ip}: {e}")))?;
        channel
            .shell()
            .await
            .map_err(|e| AgentError::protocol(format!("shell request on {ip}: {e}")))?;

        let mut shell = InteractiveShell::new(channel);
        let password_changed = shell.maybe_change_password(preferred_password, timeout).await?;

        if password_changed {
            drop(shell);
            let _ = session.disconnect(None, "credential rotated", None).await;
            let new_cred = Credential {
                username: cred.username.clone(),
                password: preferred_password.to_owned(),
            };
            let (session, _outcome) =
                Box::pin(Self::try_credential(ip, port, &new_cred, preferred_password, timeout))
                    .await?;
            return Ok((
                session,
                OpenOutcome { username: new_cred.username, password_changed: true },
            ));
        }

        let session_wrapper = SwitchSession { ip: ip.to_owned(), shell, session };
        Ok((
            session_wrapper,
            OpenOutcome { username: cred.username.clone(), password_changed: false },
        ))
    }

    pub async fn run(&mut self, cmd: &str, timeout: Duration) -> Result<(String, bool), AgentError> {
        self.shell.run(cmd, timeout).await
    }

    pub async fn enter_config(&mut self, timeout: Duration) -> Result<(), AgentError> {
        self.shell.enter_config(timeout).await
    }

    pub async fn exit_config(&mut self, timeout: Duration) -> Result<(), AgentError> {
        self.shell.exit_config(timeout).await
    }

    pub async fn save(&mut self, timeout: Duration) -> Result<bool, AgentError> {
        self.shell.save(timeout).await
    }

    pub fn ssh_active(&self) -> bool {
        self.shell.ssh_active
    }

    /// Release the channel and disconnect the underlying SSH session.
    /// Idempotent; safe to call even if the channel already errored out.
    pub async fn close(mut self) {
        let _ = self.session.disconnect(None, "ztp session closed", None).await;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
