// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chroxy gateway: exposes a local coding-agent process to remote clients
//! over an authenticated WebSocket protocol.

pub mod agent;
pub mod atomic_file;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod models;
pub mod permission;
pub mod ratelimit;
pub mod session_manager;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::GatewayConfig;
use gateway::{build_router, AppState};
use models::ModelAllowList;
use ratelimit::RateLimiter;
use session_manager::SessionManager;

/// Assemble shared state from configuration. Split out from [`run`] so
/// integration tests can construct a router without binding a socket.
pub fn build_state(config: GatewayConfig, shutdown: CancellationToken) -> Arc<AppState> {
    let rate_limiter = RateLimiter::new(
        Duration::from_secs(config.rate_limit_window_secs),
        config.rate_limit_max,
    );
    Arc::new(AppState {
        sessions: Arc::new(SessionManager::new(config.max_sessions, config.history_capacity)),
        clients: gateway::clients::ClientRegistry::new(),
        rate_limiter: Mutex::new(rate_limiter),
        models: ModelAllowList::unrestricted(),
        drain: gateway::drain::DrainState::new(),
        shutdown,
        config,
    })
}

/// Run the gateway until `shutdown` is cancelled or a termination signal is
/// received, serving on the configured bind address.
pub async fn run(config: GatewayConfig, shutdown: CancellationToken) -> Result<()> {
    let bind_addr: SocketAddr =
        config.bind_addr.parse().with_context(|| format!("invalid bind address {}", config.bind_addr))?;

    let state = build_state(config, shutdown.clone());
    let app = build_router(state.clone())
        .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(%bind_addr, "chroxy gateway listening");

    let sweep_handle = spawn_rate_limiter_sweep(state.clone());

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal.cancelled().await;
            info!("shutdown signal received, draining connections");
        })
        .await
        .context("gateway server error")?;

    sweep_handle.abort();
    Ok(())
}

fn spawn_rate_limiter_sweep(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let mut limiter = state.rate_limiter.lock().await;
            limiter.sweep(std::time::Instant::now());
        }
    })
}
