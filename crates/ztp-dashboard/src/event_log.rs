// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide bounded event ring (design §4.7 / C7). Append is O(1);
//! eviction is strictly by capacity and never blocks an append.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::protocol::{Event, EventType};

pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<Event>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub async fn push(&self, event: Event) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Newest-first query, optionally filtered by agent id, event type,
    /// and a `since` ISO-8601 timestamp (strict greater-than), capped at
    /// `limit` results.
    pub async fn query(
        &self,
        agent_id: Option<&str>,
        event_type: Option<EventType>,
        since: Option<&str>,
        limit: usize,
    ) -> Vec<Event> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .rev()
            .filter(|e| agent_id.is_none_or(|id| e.agent_id == id))
            .filter(|e| event_type.is_none_or(|t| e.event_type == t))
            .filter(|e| since.is_none_or(|s| e.timestamp.as_str() > s))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
