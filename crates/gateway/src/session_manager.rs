// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::agent::{AgentEvent, AgentHandle};
use crate::history::History;
use crate::models::ModelId;
use crate::permission::{PermissionBridge, DEFAULT_PERMISSION_TIMEOUT};
use crate::types::{ClientId, PermissionDecision, PermissionMode, PermissionRequestId, SessionId, SessionState};

const FANOUT_CAPACITY: usize = 512;

/// What gets broadcast to attached clients: either a plain stdout event, or
/// a permission prompt the agent is blocked on.
#[derive(Debug, Clone)]
pub enum FanoutMessage {
    Event { seq: Option<u64>, payload: Value },
    PermissionRequest { request_id: PermissionRequestId, payload: Value },
}

/// All mutable state associated with one agent session.
pub struct SessionEntry {
    pub id: SessionId,
    pub cwd: PathBuf,
    agent: Mutex<AgentHandle>,
    pub history: Mutex<History>,
    pub permission_bridge: PermissionBridge,
    name: RwLock<Option<String>>,
    state: RwLock<SessionState>,
    primary: RwLock<Option<ClientId>>,
    model: RwLock<ModelId>,
    mode: RwLock<PermissionMode>,
    fanout: broadcast::Sender<FanoutMessage>,
    /// The most recent permission prompt still awaiting a decision, if any.
    /// Lets a client that attaches after the prompt was broadcast (the
    /// broadcast channel does not buffer for late subscribers) catch up on
    /// it instead of waiting out the agent's own timeout.
    pending_permission: Mutex<Option<(PermissionRequestId, Value)>>,
    /// Assistant text streamed in pieces, keyed by `messageId`, accumulated
    /// until the matching `stream_end` arrives and the whole response is
    /// recorded to history in one entry.
    pending_responses: Mutex<HashMap<String, String>>,
}

impl SessionEntry {
    pub fn name(&self) -> Option<String> {
        self.name.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn rename(&self, name: impl Into<String>) {
        *self.name.write().unwrap_or_else(|e| e.into_inner()) = Some(name.into());
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn primary(&self) -> Option<ClientId> {
        *self.primary.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim primary control of this session for `client`, returning the
    /// previous holder if control changed hands.
    pub fn set_primary(&self, client: ClientId) -> Option<ClientId> {
        let mut guard = self.primary.write().unwrap_or_else(|e| e.into_inner());
        guard.replace(client)
    }

    /// Release primary control if `client` currently holds it.
    pub fn release_primary(&self, client: ClientId) {
        let mut guard = self.primary.write().unwrap_or_else(|e| e.into_inner());
        if *guard == Some(client) {
            *guard = None;
        }
    }

    pub fn model(&self) -> ModelId {
        self.model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_model(&self, model: ModelId) {
        *self.model.write().unwrap_or_else(|e| e.into_inner()) = model;
    }

    pub fn permission_mode(&self) -> PermissionMode {
        *self.mode.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_permission_mode(&self, mode: PermissionMode) {
        *self.mode.write().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    /// Subscribe a newly attached client to this session's event fan-out.
    pub fn subscribe(&self) -> broadcast::Receiver<FanoutMessage> {
        self.fanout.subscribe()
    }

    /// Record text typed by a client and forward it to the agent process.
    /// Recorded to history immediately -- unlike assistant text, user input
    /// arrives whole rather than in streamed pieces.
    pub async fn record_user_input(&self, client: ClientId, text: &str) -> u64 {
        let payload = serde_json::json!({
            "type": "user_input",
            "clientId": client,
            "text": text,
        });
        let seq = self.history.lock().await.push("user_input", payload.clone());
        let _ = self.fanout.send(FanoutMessage::Event { seq: Some(seq), payload });
        seq
    }

    /// Send a line to the agent process's stdin.
    pub async fn send_line(&self, line: &str) -> Result<(), crate::agent::AgentProcessError> {
        self.agent.lock().await.send_line(line).await
    }

    pub async fn is_alive(&self) -> bool {
        self.agent.lock().await.is_alive()
    }

    pub async fn shutdown(&self, grace: std::time::Duration) {
        let _ = self.agent.lock().await.shutdown(grace).await;
    }

    /// The permission prompt currently blocking the agent, if a client
    /// attaching right now needs to be caught up on it.
    pub async fn pending_permission(&self) -> Option<(PermissionRequestId, Value)> {
        self.pending_permission.lock().await.clone()
    }

    /// Broadcast a control event -- not produced by the agent process, and
    /// never recorded to history -- to every client subscribed to this
    /// session's fan-out.
    pub fn broadcast_control(&self, payload: Value) {
        let _ = self.fanout.send(FanoutMessage::Event { seq: None, payload });
    }

    /// Register an externally-sourced permission prompt (the `/permission`
    /// HTTP hook, as opposed to one the agent process raised on stdout),
    /// broadcast it to viewers, and wait up to `timeout` for a client to
    /// decide it. Returns `None` on timeout, matching the hook's documented
    /// `{"decision":"ask"}` fallback.
    pub async fn raise_permission_request(&self, payload: Value, timeout: std::time::Duration) -> Option<PermissionDecision> {
        let request_id = PermissionRequestId::new();
        *self.pending_permission.lock().await = Some((request_id, payload.clone()));
        let _ = self.fanout.send(FanoutMessage::PermissionRequest { request_id, payload });

        let resolved = self.permission_bridge.wait_for_decision(request_id, timeout).await;

        let mut pending = self.pending_permission.lock().await;
        if pending.as_ref().map(|(id, _)| *id) == Some(request_id) {
            *pending = None;
        }
        drop(pending);

        let (decision, decided_by) = resolved?;
        let resolved_event = serde_json::json!({
            "type": "permission_resolved",
            "requestId": request_id,
            "decision": decision,
            "decidedBy": decided_by,
        });
        let _ = self.fanout.send(FanoutMessage::Event { seq: None, payload: resolved_event });
        Some(decision)
    }
}

/// Owns the set of live agent sessions and enforces the session-count cap.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
    /// Creation order, oldest first. The front entry is the default session
    /// a newly authenticated client is placed into.
    order: RwLock<Vec<SessionId>>,
    max_sessions: usize,
    history_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateSessionError {
    MaxSessions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroySessionError {
    NotFound,
    LastSession,
}

impl SessionManager {
    pub fn new(max_sessions: usize, history_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            max_sessions,
            history_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.order.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The session a newly authenticated client is placed into: the oldest
    /// still-live session, or `None` if none exist yet.
    pub fn default_session(&self) -> Option<SessionId> {
        self.order.read().unwrap_or_else(|e| e.into_inner()).first().copied()
    }

    /// Spawn an agent process and register a new session for it.
    pub async fn create(
        self: &Arc<Self>,
        agent_bin: &PathBuf,
        agent_args: &[String],
        cwd: PathBuf,
        model: ModelId,
        mode: PermissionMode,
    ) -> Result<Arc<SessionEntry>, CreateSessionError> {
        if self.len() >= self.max_sessions {
            return Err(CreateSessionError::MaxSessions);
        }

        let handle = AgentHandle::spawn(agent_bin, agent_args, &cwd).await.map_err(|e| {
            warn!(error = %e, "failed to spawn agent process");
            CreateSessionError::MaxSessions
        })?;

        let id = SessionId::new();
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        let entry = Arc::new(SessionEntry {
            id,
            cwd,
            agent: Mutex::new(handle),
            history: Mutex::new(History::new(self.history_capacity)),
            permission_bridge: PermissionBridge::new(),
            name: RwLock::new(None),
            state: RwLock::new(SessionState::Starting),
            primary: RwLock::new(None),
            model: RwLock::new(model),
            mode: RwLock::new(mode),
            fanout,
            pending_permission: Mutex::new(None),
            pending_responses: Mutex::new(HashMap::new()),
        });

        self.sessions.write().unwrap_or_else(|e| e.into_inner()).insert(id, entry.clone());
        self.order.write().unwrap_or_else(|e| e.into_inner()).push(id);
        self.spawn_pump(entry.clone());
        info!(session_id = %id, "session created");
        Ok(entry)
    }

    /// Drive the agent's event stream into the session's history and
    /// fan-out channel until the process exits.
    fn spawn_pump(self: &Arc<Self>, entry: Arc<SessionEntry>) {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                let event = {
                    let mut agent = entry.agent.lock().await;
                    agent.recv().await
                };
                match event {
                    Some(AgentEvent::Line(value)) => {
                        manager.handle_agent_line(entry.clone(), value).await;
                    }
                    Some(AgentEvent::MalformedLine(line)) => {
                        warn!(session_id = %entry.id, %line, "agent emitted non-JSON stdout line");
                    }
                    Some(AgentEvent::Stderr(line)) => {
                        warn!(session_id = %entry.id, %line, "agent stderr");
                    }
                    Some(AgentEvent::Exited { code }) | None => {
                        entry.set_state(SessionState::Crashed);
                        entry.permission_bridge.cancel_all();
                        info!(session_id = %entry.id, ?code, "agent process ended");
                        break;
                    }
                }
            }
            manager.sessions.write().unwrap_or_else(|e| e.into_inner()).remove(&entry.id);
            manager.order.write().unwrap_or_else(|e| e.into_inner()).retain(|s| *s != entry.id);
        });
    }

    /// Classify one line of agent stdout and apply the recording rule that
    /// matches its kind: permission prompts are handed to the permission
    /// bridge, streamed assistant text is accumulated and only recorded once
    /// complete, `tool_start`/`user_question`/`result` are recorded as soon
    /// as they arrive, and anything else is fanned out live without being
    /// added to replayable history.
    async fn handle_agent_line(self: &Arc<Self>, entry: Arc<SessionEntry>, value: Value) {
        let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or_default().to_owned();
        match kind.as_str() {
            "permission_request" => {
                self.handle_permission_request(entry, value).await;
            }
            "stream_delta" => {
                let message_id = value.get("messageId").and_then(|v| v.as_str()).unwrap_or_default();
                let delta = value.get("delta").and_then(|v| v.as_str()).unwrap_or_default();
                entry
                    .pending_responses
                    .lock()
                    .await
                    .entry(message_id.to_owned())
                    .or_default()
                    .push_str(delta);
                let _ = entry.fanout.send(FanoutMessage::Event { seq: None, payload: value });
            }
            "stream_end" => {
                let message_id = value.get("messageId").and_then(|v| v.as_str()).unwrap_or_default();
                let text = entry.pending_responses.lock().await.remove(message_id).unwrap_or_default();
                let recorded = serde_json::json!({
                    "type": "assistant_response",
                    "messageId": message_id,
                    "text": text,
                });
                let seq = entry.history.lock().await.push("assistant_response", recorded);
                let _ = entry.fanout.send(FanoutMessage::Event { seq: Some(seq), payload: value });
            }
            "tool_start" | "user_question" | "result" => {
                let seq = entry.history.lock().await.push(&kind, value.clone());
                let _ = entry.fanout.send(FanoutMessage::Event { seq: Some(seq), payload: value });
            }
            _ => {
                let _ = entry.fanout.send(FanoutMessage::Event { seq: None, payload: value });
            }
        }
    }

    /// Raise a permission prompt surfaced by the agent: register it with the
    /// session's bridge, broadcast it to attached clients, then wait (off
    /// the pump task) for a decision and report it back to the agent on its
    /// stdin. A prompt that nobody answers in time is reported to the agent
    /// as a denial, matching the conservative default for an unattended
    /// gateway.
    async fn handle_permission_request(self: &Arc<Self>, entry: Arc<SessionEntry>, value: Value) {
        let request_id = PermissionRequestId::new();
        let payload = value.get("payload").cloned().unwrap_or(value);

        // Record the pending prompt before broadcasting so a client that
        // attaches in the gap between the broadcast send and its own
        // subscribe call can still catch up on it via `pending_permission`.
        *entry.pending_permission.lock().await = Some((request_id, payload.clone()));
        let _ = entry
            .fanout
            .send(FanoutMessage::PermissionRequest { request_id, payload: payload.clone() });
        entry.set_state(SessionState::AwaitingPermission);

        tokio::spawn(async move {
            let resolved = entry
                .permission_bridge
                .wait_for_decision(request_id, DEFAULT_PERMISSION_TIMEOUT)
                .await;
            let (decision, decided_by) =
                resolved.unwrap_or((PermissionDecision::Deny, ClientId::default()));

            let mut pending = entry.pending_permission.lock().await;
            if pending.as_ref().map(|(id, _)| *id) == Some(request_id) {
                *pending = None;
            }
            drop(pending);

            let response = serde_json::json!({
                "type": "permission_response",
                "request_id": request_id,
                "decision": decision,
            });
            if let Err(e) = entry.send_line(&response.to_string()).await {
                warn!(session_id = %entry.id, error = %e, "failed to deliver permission decision to agent");
            }
            if entry.state() == SessionState::AwaitingPermission {
                entry.set_state(SessionState::Busy);
            }

            let resolved_event = serde_json::json!({
                "type": "permission_resolved",
                "requestId": request_id,
                "decision": decision,
                "decidedBy": decided_by,
            });
            let _ = entry.fanout.send(FanoutMessage::Event { seq: None, payload: resolved_event });
        });
    }

    /// Remove and shut down a session. Refuses to remove the last remaining
    /// session so there is always at least one place for a client to land;
    /// callers that want to allow zero sessions should check `len()` first.
    pub async fn destroy(
        &self,
        id: SessionId,
        allow_last: bool,
    ) -> Result<(), DestroySessionError> {
        if !allow_last && self.len() <= 1 {
            return Err(DestroySessionError::LastSession);
        }
        let entry = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.remove(&id)
        };
        match entry {
            Some(entry) => {
                self.order.write().unwrap_or_else(|e| e.into_inner()).retain(|s| *s != id);
                entry.set_state(SessionState::Closed);
                entry.permission_bridge.cancel_all();
                entry.shutdown(std::time::Duration::from_secs(5)).await;
                Ok(())
            }
            None => Err(DestroySessionError::NotFound),
        }
    }
}

#[cfg(test)]
#[path = "session_manager_tests.rs"]
mod tests;
