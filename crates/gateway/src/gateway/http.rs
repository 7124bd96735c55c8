// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ErrorCode;
use crate::types::SessionId;

use super::auth::validate_bearer;
use super::protocol::SessionSummary;
use super::AppState;

/// Upper bound on a `/permission` request body. Generous for any reasonable
/// tool-call payload while keeping a single slow client from holding an
/// unbounded buffer.
const MAX_HOOK_BODY_BYTES: usize = 64 * 1024;

/// How long the hook blocks waiting for a client to answer before it falls
/// back to `{"decision":"ask"}`, matching the in-band permission prompt's own
/// timeout.
const PERMISSION_HOOK_TIMEOUT: Duration = Duration::from_secs(300);

fn error_response(code: ErrorCode, message: impl Into<String>) -> axum::response::Response {
    let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(crate::error::ErrorResponse { error: code.to_error_body(message) })).into_response()
}

fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), axum::response::Response> {
    match &state.config.auth_token {
        None => Ok(()),
        Some(expected) if validate_bearer(headers, expected) => Ok(()),
        Some(_) => Err(error_response(ErrorCode::InvalidToken, "missing or invalid bearer token")),
    }
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.drain.is_draining() {
        return error_response(ErrorCode::Draining, "gateway is draining");
    }
    Json(serde_json::json!({ "status": "ok", "sessions": state.sessions.len() })).into_response()
}

pub async fn list_sessions(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }

    let summaries: Vec<SessionSummary> = state
        .sessions
        .list()
        .into_iter()
        .filter_map(|id| state.sessions.get(id))
        .map(|entry| SessionSummary {
            session_id: entry.id,
            name: entry.name(),
            state: entry.state(),
            model: entry.model(),
            permission_mode: entry.permission_mode(),
            cwd: entry.cwd.display().to_string(),
        })
        .collect();

    Json(serde_json::json!({ "sessions": summaries })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionHookRequest {
    /// Which session this prompt belongs to. Required once more than one
    /// session exists; with exactly one session, it is inferred.
    pub session_id: Option<SessionId>,
    /// Opaque tool-call context shown to the client verbatim.
    pub payload: Value,
}

/// Long-polling webhook a permission-prompting tool (outside the agent's own
/// stdout stream, e.g. a Claude Code hook script) posts to for a human
/// decision. Blocks for up to five minutes; if nothing answers in time, it
/// resolves conservatively to `{"decision":"ask"}` rather than guessing.
pub async fn permission_hook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }
    if body.len() > MAX_HOOK_BODY_BYTES {
        return error_response(ErrorCode::Oversized, "request body exceeds 64 KiB");
    }

    let req: PermissionHookRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return error_response(ErrorCode::BadField, format!("invalid body: {e}")),
    };

    let session_id = match req.session_id {
        Some(id) => id,
        None => {
            let sessions = state.sessions.list();
            match sessions.as_slice() {
                [only] => *only,
                _ => {
                    return error_response(
                        ErrorCode::BadField,
                        "sessionId is required when more than one session exists",
                    )
                }
            }
        }
    };

    let Some(entry) = state.sessions.get(session_id) else {
        return error_response(ErrorCode::SessionNotFound, "no such session");
    };

    let decision = entry.raise_permission_request(req.payload, PERMISSION_HOOK_TIMEOUT).await;
    let decision = decision
        .map(|d| serde_json::to_value(d).unwrap_or_else(|_| serde_json::json!("deny")))
        .unwrap_or_else(|| serde_json::json!("ask"));
    Json(serde_json::json!({ "decision": decision })).into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
