// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorBody;
use crate::gateway::clients::DeviceInfo;
use crate::models::ModelId;
use crate::types::{ClientId, PermissionDecision, PermissionMode, PermissionRequestId, SessionId, SessionState};

/// Messages a client may send over the WebSocket connection.
///
/// `Auth` is the only message accepted before authentication completes;
/// every other variant targets the sender's current viewing session rather
/// than carrying an explicit `session_id`, since a client views exactly one
/// session at a time (see `switch_session`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Authenticate the connection. Must be the first message sent; the
    /// gateway drops anything else until this arrives or the auth timer
    /// expires.
    Auth { token: Option<String>, device: DeviceInfo },
    /// Create a new agent session rooted at `cwd`.
    CreateSession {
        cwd: Option<String>,
        model: Option<ModelId>,
        permission_mode: Option<PermissionMode>,
    },
    /// Switch this client's viewing session to an existing one.
    SwitchSession { session_id: SessionId },
    /// Give a session a human-readable name.
    RenameSession { session_id: SessionId, name: String },
    /// Destroy a session outright.
    DestroySession { session_id: SessionId },
    /// List sessions currently known to the gateway.
    ListSessions,
    /// Browse directories on the gateway host, for session-creation cwd
    /// pickers.
    ListDirectory { path: Option<String> },
    /// Send user input to the viewing session's agent process.
    Input { text: String },
    /// Ask the agent to interrupt its current turn.
    Interrupt,
    /// Request a model switch for the viewing session.
    SetModel { model: ModelId },
    /// Request a permission-mode switch for the viewing session. Switching
    /// into `auto` is not applied until the client answers the gateway's
    /// `confirm_permission_mode` prompt with `confirmed`.
    SetPermissionMode { mode: PermissionMode },
    /// Answer a pending `confirm_permission_mode` prompt.
    Confirmed { confirmed: bool },
    /// Answer an outstanding permission request.
    PermissionResponse { request_id: PermissionRequestId, decision: PermissionDecision },
    /// Answer a question the agent asked mid-turn.
    UserQuestionResponse { question_id: String, response: String },
    /// Client-initiated keepalive.
    Ping,
}

/// Messages the gateway sends to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AuthOk {
        client_id: ClientId,
        server_mode: String,
        server_version: String,
        connected_clients: Vec<ConnectedClient>,
        sessions: Vec<SessionSummary>,
        models: Vec<ModelSummary>,
    },
    AuthFail {
        reason: String,
    },
    Error {
        error: ErrorBody,
    },
    SessionCreated {
        session: SessionSummary,
    },
    SessionList {
        sessions: Vec<SessionSummary>,
    },
    SessionRenamed {
        session_id: SessionId,
        name: String,
    },
    SessionStateChanged {
        session_id: SessionId,
        state: SessionState,
    },
    SessionDestroyed {
        session_id: SessionId,
    },
    PrimaryChanged {
        session_id: SessionId,
        client_id: Option<ClientId>,
    },
    ClientJoined {
        session_id: SessionId,
        client: ConnectedClient,
    },
    ClientLeft {
        session_id: SessionId,
        client_id: ClientId,
    },
    ConfirmPermissionMode {
        session_id: SessionId,
        mode: PermissionMode,
    },
    PermissionModeChanged {
        session_id: SessionId,
        mode: PermissionMode,
    },
    ModelChanged {
        session_id: SessionId,
        model: ModelId,
    },
    HistoryReplayStart {
        session_id: SessionId,
        from_seq: u64,
    },
    HistoryReplayEnd {
        session_id: SessionId,
    },
    StreamStart {
        session_id: SessionId,
        message_id: String,
    },
    StreamDelta {
        session_id: SessionId,
        message_id: String,
        delta: String,
    },
    StreamEnd {
        session_id: SessionId,
        message_id: String,
    },
    ToolStart {
        session_id: SessionId,
        tool_use_id: String,
        payload: Value,
    },
    UserQuestion {
        session_id: SessionId,
        question_id: String,
        payload: Value,
    },
    TurnResult {
        session_id: SessionId,
        payload: Value,
    },
    AgentEvent {
        session_id: SessionId,
        seq: Option<u64>,
        payload: Value,
    },
    PermissionRequest {
        session_id: SessionId,
        request_id: PermissionRequestId,
        payload: Value,
    },
    PermissionResolved {
        session_id: SessionId,
        request_id: PermissionRequestId,
        decision: PermissionDecision,
        decided_by: ClientId,
    },
    DirectoryListing {
        path: String,
        entries: Vec<DirectoryEntry>,
    },
    Draining,
    Pong,
}

/// A connected client as seen by other viewers of the same session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedClient {
    pub client_id: ClientId,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub name: Option<String>,
    pub state: SessionState,
    pub model: ModelId,
    pub permission_mode: PermissionMode,
    pub cwd: String,
}

/// One entry of the closed model table, as offered to clients for
/// `set_model`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub short_id: String,
    pub long_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
