// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds surfaced by the dashboard API and RPC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    AuthError,
    TransientError,
    ProtocolError,
    ParseError,
    Timeout,
    Busy,
    AgentOffline,
    RateLimited,
    ConfigError,
    NotFound,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthError => 401,
            Self::TransientError => 503,
            Self::ProtocolError => 502,
            Self::ParseError => 400,
            Self::Timeout => 504,
            Self::Busy => 409,
            Self::AgentOffline => 409,
            Self::RateLimited => 429,
            Self::ConfigError => 400,
            Self::NotFound => 404,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "AuthError",
            Self::TransientError => "TransientError",
            Self::ProtocolError => "ProtocolError",
            Self::ParseError => "ParseError",
            Self::Timeout => "Timeout",
            Self::Busy => "Busy",
            Self::AgentOffline => "AgentOffline",
            Self::RateLimited => "RateLimited",
            Self::ConfigError => "ConfigError",
            Self::NotFound => "NotFound",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dashboard-side error: a kind plus a human-readable message.
#[derive(Debug, Clone)]
pub struct DashboardError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DashboardError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthError, message)
    }

    pub fn agent_offline(agent_id: &str) -> Self {
        Self::new(ErrorKind::AgentOffline, format!("agent {agent_id} is offline"))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Build a `DashboardError` from an `rpc_result` frame's `result` value
    /// on `ok: false` (design §7: the agent's error envelope is `{"kind":
    /// ..., "message": ...}`, the same shape this dashboard returns to its
    /// own HTTP clients).
    pub fn from_rpc_error(result: &serde_json::Value) -> Self {
        let kind = result
            .get("kind")
            .cloned()
            .and_then(|v| serde_json::from_value::<ErrorKind>(v).ok())
            .unwrap_or(ErrorKind::ProtocolError);
        let message = result
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("agent reported an error")
            .to_owned();
        Self::new(kind, message)
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { kind: self.kind.as_str().to_owned(), message: self.message.clone() }
    }
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DashboardError {}

impl axum::response::IntoResponse for DashboardError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body() };
        (status, Json(body)).into_response()
    }
}

/// Top-level error response envelope: `{"error": {"kind": ..., "message": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}
