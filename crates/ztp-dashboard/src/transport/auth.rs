// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two independent auth mechanisms live here (design §4.5, §4.6, §4.8):
//!
//! 1. A shared bearer token gating every inbound agent WebSocket upgrade.
//! 2. A per-agent password gate for the browser UI, backed by a
//!    stateless HMAC-SHA256-signed session cookie scoped to one agent id.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;

use crate::error::DashboardError;
use crate::state::DashboardState;

const COOKIE_NAME: &str = "ztp_session";
const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP/WS-upgrade headers against the
/// configured shared agent auth token. `None` disables the check.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), DashboardError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DashboardError::auth("missing authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| DashboardError::auth("authorization header is not a bearer token"))?;

    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(DashboardError::auth("bearer token mismatch"))
    }
}

pub fn hash_password(password: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, password.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_ref())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    constant_time_eq(&hash_password(password), stored_hash)
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Sign an opaque, stateless session cookie scoped to `agent_id` (design
/// §4.8 expansion). Format: `base64(agent_id:issued_at).base64(hmac)`.
pub fn sign_session_cookie(key: &[u8], agent_id: &str) -> String {
    let payload = format!("{agent_id}:{}", now_unix());
    let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), payload.as_bytes());
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    )
}

/// Verify a session cookie is validly signed, not expired, and scoped to
/// `agent_id`. A cookie is rejected for any other agent id (design §4.8).
pub fn verify_session_cookie(key: &[u8], cookie: &str, agent_id: &str) -> bool {
    let Some((payload_b64, sig_b64)) = cookie.split_once('.') else { return false };
    let Ok(payload_bytes) = URL_SAFE_NO_PAD.decode(payload_b64) else { return false };
    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(sig_b64) else { return false };

    if hmac::verify(&hmac::Key::new(hmac::HMAC_SHA256, key), &payload_bytes, &sig_bytes).is_err() {
        return false;
    }

    let Ok(payload) = String::from_utf8(payload_bytes) else { return false };
    let Some((cookie_agent_id, issued_at_str)) = payload.split_once(':') else { return false };
    let Ok(issued_at) = issued_at_str.parse::<u64>() else { return false };

    cookie_agent_id == agent_id && now_unix().saturating_sub(issued_at) <= SESSION_TTL.as_secs()
}

pub fn extract_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let pair = pair.trim();
        pair.strip_prefix(&format!("{COOKIE_NAME}="))
    })
    .map(str::to_owned)
}

pub fn set_cookie_header(cookie: &str) -> String {
    format!("{COOKIE_NAME}={cookie}; Path=/; HttpOnly; SameSite=Lax")
}

/// Axum middleware enforcing the per-agent password gate on
/// `/api/edge-agents/{agent_id}/...` routes (design §4.8: "Unauthenticated
/// API calls for that agent return 401"). The HTML `/{agent_id}` view is
/// deliberately NOT gated here: it renders its own login form inline
/// rather than bouncing the browser with a bare 401 (see
/// `http::agent_view`).
pub async fn auth_layer(
    state: State<Arc<DashboardState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();

    let Some(agent_id) = extract_agent_scoped_id(&path) else {
        return next.run(req).await;
    };

    let Some(record) = state.get(&agent_id).await else {
        return DashboardError::not_found(format!("unknown agent {agent_id}")).into_response();
    };

    let has_password = record.password_hash.read().await.is_some();
    if !has_password {
        return next.run(req).await;
    }

    let cookie = extract_cookie(req.headers());
    let authorized =
        cookie.is_some_and(|c| verify_session_cookie(&state.cookie_key, &c, &agent_id));

    if !authorized {
        return DashboardError::auth("missing or invalid session cookie").into_response();
    }

    next.run(req).await
}

/// Matches `/api/edge-agents/{id}` and `/api/edge-agents/{id}/...`, the
/// only routes gated by the per-agent password (design §4.8). Global
/// routes (`/api/edge-agents` with no id, `/api/ztp/...`) are left alone.
fn extract_agent_scoped_id(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/api/edge-agents/")?;
    let id = rest.split('/').next().unwrap_or(rest);
    if id.is_empty() {
        None
    } else {
        Some(id.to_owned())
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
