// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WebSocket gateway: HTTP/WS routing, auth, client registry, and the
//! wire protocol between clients and the session manager.

pub mod auth;
pub mod clients;
pub mod drain;
pub mod http;
pub mod protocol;
pub mod ws;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::models::ModelAllowList;
use crate::ratelimit::RateLimiter;
use crate::session_manager::SessionManager;
use clients::ClientRegistry;
use drain::DrainState;

/// Shared application state reachable from every handler.
pub struct AppState {
    pub config: GatewayConfig,
    pub sessions: Arc<SessionManager>,
    pub clients: ClientRegistry,
    pub rate_limiter: Mutex<RateLimiter>,
    pub models: ModelAllowList,
    pub drain: DrainState,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Whether `ip` is currently serving out an authentication cooldown and
    /// should have its `auth` message refused before the token is even
    /// checked.
    pub async fn is_auth_blocked(&self, ip: IpAddr) -> bool {
        let limiter = self.rate_limiter.lock().await;
        limiter.is_cooling_down(ip, std::time::Instant::now())
    }

    pub async fn record_auth_failure(&self, ip: IpAddr) {
        let mut limiter = self.rate_limiter.lock().await;
        limiter.record_auth_failure(ip, std::time::Instant::now());
    }

    pub async fn record_auth_success(&self, ip: IpAddr) {
        let mut limiter = self.rate_limiter.lock().await;
        limiter.record_auth_success(ip);
    }
}

/// Build the axum router serving both the WebSocket upgrade endpoint and the
/// plain HTTP control surface (health, session listing, the permission
/// hook).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(http::healthz))
        .route("/ws", get(ws::ws_handler))
        .route("/sessions", get(http::list_sessions))
        .route("/permission", post(http::permission_hook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// How long the gateway waits for in-flight requests to finish once a drain
/// has been requested before forcing connections closed.
pub const DRAIN_GRACE: Duration = Duration::from_secs(30);

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
