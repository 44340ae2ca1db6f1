// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

#[tokio::test]
async fn resolve_delivers_outcome_to_the_receiver() {
    let waiters = RpcWaiters::new();
    let (request_id, rx) = waiters.register("site-1").await;
    let resolved = waiters.resolve(&request_id, true, json!({"output": "ok"})).await;
    assert!(resolved);
    let outcome = rx.await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.result, json!({"output": "ok"}));
}

#[tokio::test]
async fn resolve_on_unknown_request_id_is_a_no_op() {
    let waiters = RpcWaiters::new();
    let resolved = waiters.resolve("does-not-exist", true, json!(null)).await;
    assert!(!resolved);
}

#[tokio::test]
async fn cancel_for_agent_drops_only_that_agents_waiters() {
    let waiters = RpcWaiters::new();
    let (id_a, rx_a) = waiters.register("site-1").await;
    let (id_b, rx_b) = waiters.register("site-2").await;

    waiters.cancel_for_agent("site-1").await;

    assert!(rx_a.await.is_err());
    assert!(!waiters.resolve(&id_a, true, json!(null)).await);
    assert!(waiters.resolve(&id_b, true, json!(null)).await);
    assert!(rx_b.await.is_ok());
}

#[tokio::test]
async fn abandon_removes_the_waiter_without_resolving() {
    let waiters = RpcWaiters::new();
    let (request_id, rx) = waiters.register("site-1").await;
    waiters.abandon(&request_id).await;
    assert!(!waiters.resolve(&request_id, true, json!(null)).await);
    assert!(rx.await.is_err());
}
