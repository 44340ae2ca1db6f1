// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed state machine over RUCKUS ICX CLI prompts (design §9, "Control
//! flow for CLI"). The source this system replaces interleaves blocking
//! reads with ad-hoc string scanning; here prompt recognition is an
//! explicit enum with named transitions so a reviewer can see every state
//! the session can be in without tracing through `run`.

/// A prompt state the interactive session can observe in a chunk of raw
/// output. `classify` is a pure function of the trailing text; it never
/// touches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// No recognizable prompt yet (still mid-banner or mid-output).
    Unauth,
    /// `Please Enter Login Name:` or similar.
    Login,
    /// `Password:`
    PasswordPrompt,
    /// Vendor forced first-login flow: `Enter new password:`.
    NewPasswordPrompt,
    /// `SSH@hostname>` (unprivileged exec).
    Exec,
    /// `SSH@hostname#` (privileged exec / enable mode).
    Enable,
    /// `SSH@hostname(config)#`.
    Config,
    /// `SSH@hostname(config-if-e1000-1/1/4)#` or similar nested context.
    InterfaceConfig,
    /// `--More--` paging marker; caller must send a space to continue.
    Paged,
}

impl PromptState {
    /// Classify the trailing text of a CLI output chunk. Ordering matters:
    /// more specific markers (paging, new-password) are checked before the
    /// generic prompt suffixes they could otherwise be confused with.
    pub fn classify(chunk: &str) -> Option<Self> {
        let trimmed = chunk.trim_end();
        let tail = last_n_lines(trimmed, 3);

        if tail.contains("--More--") {
            return Some(Self::Paged);
        }
        if contains_ci(&tail, "enter new password") || contains_ci(&tail, "new password:") {
            return Some(Self::NewPasswordPrompt);
        }
        if contains_ci(&tail, "password:") {
            return Some(Self::PasswordPrompt);
        }
        if contains_ci(&tail, "login name:") || contains_ci(&tail, "username:") {
            return Some(Self::Login);
        }
        if let Some(last_line) = tail.lines().last() {
            let last_line = last_line.trim_end();
            if last_line.ends_with(")#") && last_line.contains("(config-if") {
                return Some(Self::InterfaceConfig);
            }
            if last_line.ends_with("(config)#") {
                return Some(Self::Config);
            }
            if last_line.ends_with('#') {
                return Some(Self::Enable);
            }
            if last_line.ends_with('>') {
                return Some(Self::Exec);
            }
        }
        None
    }

    /// Whether this state represents a privileged prompt the engine can
    /// run arbitrary `show`/config commands from.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Enable | Self::Config | Self::InterfaceConfig)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn last_n_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
