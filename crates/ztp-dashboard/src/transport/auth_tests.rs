// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

use super::*;

fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
    headers
}

#[test]
fn validate_bearer_accepts_matching_token() {
    let headers = bearer_headers("secret");
    assert!(validate_bearer(&headers, Some("secret")).is_ok());
}

#[test]
fn validate_bearer_rejects_mismatched_token() {
    let headers = bearer_headers("wrong");
    assert!(validate_bearer(&headers, Some("secret")).is_err());
}

#[test]
fn validate_bearer_rejects_missing_header() {
    let headers = HeaderMap::new();
    assert!(validate_bearer(&headers, Some("secret")).is_err());
}

#[test]
fn validate_bearer_disabled_when_no_expected_token() {
    let headers = HeaderMap::new();
    assert!(validate_bearer(&headers, None).is_ok());
}

#[test]
fn password_hash_round_trips_through_verify() {
    let hash = hash_password("hunter2");
    assert!(verify_password("hunter2", &hash));
    assert!(!verify_password("wrong", &hash));
}

#[test]
fn session_cookie_round_trips_for_its_own_agent() {
    let key = b"0123456789abcdef0123456789abcdef";
    let cookie = sign_session_cookie(key, "site-1");
    assert!(verify_session_cookie(key, &cookie, "site-1"));
}

#[test]
fn session_cookie_is_rejected_for_a_different_agent() {
    let key = b"0123456789abcdef0123456789abcdef";
    let cookie = sign_session_cookie(key, "site-1");
    assert!(!verify_session_cookie(key, &cookie, "site-2"));
}

#[test]
fn session_cookie_is_rejected_under_a_different_key() {
    let key_a = b"0123456789abcdef0123456789abcdef";
    let key_b = b"fedcba9876543210fedcba9876543210";
    let cookie = sign_session_cookie(key_a, "site-1");
    assert!(!verify_session_cookie(key_b, &cookie, "site-1"));
}

#[test]
fn session_cookie_rejects_garbage_input() {
    let key = b"0123456789abcdef0123456789abcdef";
    assert!(!verify_session_cookie(key, "not-a-real-cookie", "site-1"));
    assert!(!verify_session_cookie(key, "a.b", "site-1"));
}

#[test]
fn extract_cookie_finds_named_cookie_among_others() {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::COOKIE,
        "other=1; ztp_session=abc.def; another=2".parse().unwrap(),
    );
    assert_eq!(extract_cookie(&headers), Some("abc.def".to_owned()));
}

#[test]
fn extract_agent_scoped_id_matches_only_the_agent_api_prefix() {
    assert_eq!(extract_agent_scoped_id("/api/edge-agents/site-1/command"), Some("site-1".to_owned()));
    assert_eq!(extract_agent_scoped_id("/api/edge-agents/site-1"), Some("site-1".to_owned()));
    assert_eq!(extract_agent_scoped_id("/site-1"), None);
    assert_eq!(extract_agent_scoped_id("/api/edge-agents"), None);
    assert_eq!(extract_agent_scoped_id("/api/ztp/status"), None);
    assert_eq!(extract_agent_scoped_id("/"), None);
    assert_eq!(extract_agent_scoped_id("/ws/agent/site-1"), None);
}
