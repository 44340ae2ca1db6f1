// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the dashboard aggregator.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::DashboardState;

/// Build the axum `Router` with all dashboard routes (design §4.8 / C8).
pub fn build_router(state: Arc<DashboardState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Browser UI
        .route("/", get(http::index))
        .route("/{agent_id}", get(http::agent_view))
        .route("/{agent_id}/login", post(http::login_submit))
        // Agent inventory and control (password-gated by auth_layer below)
        .route("/api/edge-agents", get(http::list_agents))
        .route("/api/edge-agents/{agent_id}", get(http::agent_detail))
        .route("/api/edge-agents/{agent_id}/password", post(http::set_password))
        .route("/api/edge-agents/{agent_id}/command", post(http::post_command))
        .route("/api/edge-agents/{agent_id}/config", post(http::post_config))
        .route("/api/edge-agents/{agent_id}/control", post(http::post_control))
        // Fleet-wide aggregation
        .route("/api/ztp/status", get(http::ztp_status))
        .route("/api/ztp/events", get(http::ztp_events))
        .route("/api/ztp/inventory", get(http::ztp_inventory))
        // Inbound agent WebSocket
        .route("/ws/agent/{agent_id}", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
