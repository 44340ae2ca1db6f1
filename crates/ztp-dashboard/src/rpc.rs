// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dashboard-side RPC waiter table (design §4.9 / C9). `rpc_call` frames
//! are forwarded to the target agent's live connection; the waiter
//! registered here resolves on a matching `rpc_result`, or is dropped
//! (resolving the receiver with an error) on timeout or agent disconnect.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RpcOutcome {
    pub ok: bool,
    pub result: Value,
}

struct Waiter {
    agent_id: String,
    tx: oneshot::Sender<RpcOutcome>,
}

pub struct RpcWaiters {
    inner: Mutex<HashMap<String, Waiter>>,
}

impl RpcWaiters {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    /// Allocate a fresh `request_id` and register a waiter for it, bound
    /// to `agent_id` so a disconnect can cancel it in bulk.
    pub async fn register(&self, agent_id: &str) -> (String, oneshot::Receiver<RpcOutcome>) {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(request_id.clone(), Waiter { agent_id: agent_id.to_owned(), tx });
        (request_id, rx)
    }

    /// Remove a waiter without resolving it, e.g. after a timeout already
    /// observed by the caller (design §4.9: "rejects on timeout").
    pub async fn abandon(&self, request_id: &str) {
        self.inner.lock().await.remove(request_id);
    }

    /// Resolve a waiter by `request_id` on receipt of the matching
    /// `rpc_result` frame. Returns `false` if no such waiter was pending
    /// (already timed out, or never registered).
    pub async fn resolve(&self, request_id: &str, ok: bool, result: Value) -> bool {
        let waiter = self.inner.lock().await.remove(request_id);
        match waiter {
            Some(w) => w.tx.send(RpcOutcome { ok, result }).is_ok(),
            None => false,
        }
    }

    /// Drop every waiter registered for `agent_id`; their receivers
    /// observe a closed channel (design §4.9: "cancelled if the agent
    /// disconnects").
    pub async fn cancel_for_agent(&self, agent_id: &str) {
        self.inner.lock().await.retain(|_, w| w.agent_id != agent_id);
    }
}

impl Default for RpcWaiters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
