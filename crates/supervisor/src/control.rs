// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::watch;

/// Counters and a restart-trigger channel shared between the supervisor's
/// monitor loop and its small HTTP control surface.
pub struct SupervisorStatus {
    pub restarts: AtomicU32,
    pub current_pid: AtomicU64,
    restart_tx: watch::Sender<u64>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        let (restart_tx, _rx) = watch::channel(0);
        Self { restarts: AtomicU32::new(0), current_pid: AtomicU64::new(0), restart_tx }
    }
}

impl SupervisorStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the monitor loop restart the gateway process as soon as
    /// it next checks for a request, bumping the generation counter so
    /// late-arriving duplicate requests don't each trigger a restart.
    pub fn request_restart(&self) {
        let next = self.restart_tx.borrow().wrapping_add(1);
        let _ = self.restart_tx.send(next);
    }

    pub fn restart_requests(&self) -> watch::Receiver<u64> {
        self.restart_tx.subscribe()
    }
}

pub fn build_control_router(status: Arc<SupervisorStatus>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/restart", post(restart_handler))
        .with_state(status)
}

async fn status_handler(State(status): State<Arc<SupervisorStatus>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "restarts": status.restarts.load(Ordering::Relaxed),
        "current_pid": status.current_pid.load(Ordering::Relaxed),
    }))
}

async fn restart_handler(State(status): State<Arc<SupervisorStatus>>) -> impl IntoResponse {
    status.request_restart();
    Json(serde_json::json!({ "requested": true }))
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
