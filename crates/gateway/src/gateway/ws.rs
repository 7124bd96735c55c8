// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::gateway::clients::DeviceInfo;
use crate::models::ModelId;
use crate::permission::ResolveError;
use crate::session_manager::{CreateSessionError, DestroySessionError, FanoutMessage, SessionEntry};
use crate::types::{ClientId, PermissionDecision, PermissionMode, PermissionRequestId, SessionId, SessionState};

use super::protocol::{
    ClientMessage, ConnectedClient, DirectoryEntry, ModelSummary, ServerMessage, SessionSummary,
};
use super::AppState;

const OUTBOX_CAPACITY: usize = 256;
const DELTA_COALESCE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);
/// Sent when a client misses too many consecutive ping deadlines, matching
/// the abnormal-condition range of RFC 6455 section 7.4.1.
const CLOSE_PING_MISSED: u16 = 1011;
/// Sent once the gateway finishes draining a connection, or on an otherwise
/// unremarkable disconnect.
const CLOSE_GOING_AWAY: u16 = 1001;
/// Consecutive missed pings tolerated before a connection is considered dead.
const MAX_MISSED_PINGS: u8 = 2;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if state.drain.is_draining() {
        return draining_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr)).into_response()
}

fn draining_response() -> axum::response::Response {
    let status = StatusCode::from_u16(ErrorCode::Draining.http_status()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    (status, Json(crate::error::ErrorResponse { error: ErrorCode::Draining.to_error_body("gateway is draining") }))
        .into_response()
}

/// What the writer task can be asked to put on the wire: an application
/// message, a ping frame, or a close frame with a specific code. Routed
/// through one channel so the socket sink -- which can only be owned by one
/// task -- stays entirely inside the writer.
enum Outbound {
    Message(ServerMessage),
    Ping,
    Close(u16),
}

#[derive(Clone)]
struct Outbox(mpsc::Sender<Outbound>);

impl Outbox {
    async fn send(&self, msg: ServerMessage) {
        let _ = self.0.send(Outbound::Message(msg)).await;
    }

    async fn ping(&self) {
        let _ = self.0.send(Outbound::Ping).await;
    }

    async fn close(&self, code: u16) {
        let _ = self.0.send(Outbound::Close(code)).await;
    }
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let client_id = ClientId::new();
    state.clients.register(client_id, addr.ip(), Instant::now());
    info!(%client_id, %addr, "client connected");

    let (mut sink, mut stream) = socket.split();
    let (raw_tx, mut raw_rx) = mpsc::channel::<Outbound>(OUTBOX_CAPACITY);
    let tx = Outbox(raw_tx);

    let writer = tokio::spawn(async move {
        while let Some(out) = raw_rx.recv().await {
            let result = match out {
                Outbound::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(text) => sink.send(Message::Text(text.into())).await,
                    Err(_) => continue,
                },
                Outbound::Ping => sink.send(Message::Ping(Vec::new().into())).await,
                Outbound::Close(code) => {
                    let _ = sink.send(Message::Close(Some(CloseFrame { code, reason: "".into() }))).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    let Some(default_session) = await_auth(&mut stream, &state, &tx, client_id, addr).await else {
        state.clients.unregister(client_id);
        tx.close(CLOSE_GOING_AWAY).await;
        drop(tx);
        let _ = writer.await;
        info!(%client_id, "client disconnected before authenticating");
        return;
    };

    let mut conn = ConnectionState::default();
    if let Some(session_id) = default_session {
        conn.attach(&state, client_id, &tx, session_id).await;
    }

    let ping_interval = std::time::Duration::from_secs(state.config.ping_interval_secs.max(1));
    let mut ping_ticker = tokio::time::interval(ping_interval);
    let mut delta_ticker = tokio::time::interval(DELTA_COALESCE_INTERVAL);
    let mut missed_pings = 0u8;
    let mut draining = false;
    let mut close_code = CLOSE_GOING_AWAY;
    let mut drain_deadline: Option<tokio::time::Instant> = None;

    'outer: loop {
        let fanout_recv = async {
            match &mut conn.rx_session {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            }
        };
        let drain_wait = async {
            match drain_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            () = drain_wait, if draining => {
                close_code = CLOSE_GOING_AWAY;
                break 'outer;
            }

            () = state.drain.wait(), if !draining => {
                draining = true;
                drain_deadline = Some(tokio::time::Instant::now() + super::DRAIN_GRACE);
                tx.send(ServerMessage::Draining).await;
            }

            _ = ping_ticker.tick() => {
                missed_pings += 1;
                if missed_pings > MAX_MISSED_PINGS {
                    warn!(%client_id, "client missed ping deadline, disconnecting");
                    close_code = CLOSE_PING_MISSED;
                    break 'outer;
                }
                tx.ping().await;
            }

            _ = delta_ticker.tick() => {
                conn.flush_deltas(&tx).await;
            }

            event = fanout_recv => {
                match event {
                    Ok(message) => conn.forward_fanout(&tx, message).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {}
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        missed_pings = 0;
                        let keep_going = if draining {
                            dispatch_while_draining(&text, &tx).await
                        } else {
                            dispatch(&text, &state, client_id, &tx, &mut conn).await
                        };
                        if !keep_going {
                            break 'outer;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_pings = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => break 'outer,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%client_id, error = %e, "websocket error");
                        break 'outer;
                    }
                }
            }
        }
    }

    if let Some(session_id) = conn.viewing {
        conn.detach(&state, client_id, session_id).await;
    }
    state.clients.unregister(client_id);
    tx.close(close_code).await;
    drop(tx);
    let _ = writer.await;
    info!(%client_id, "client disconnected");
}

/// Hold the connection open until a well-formed `auth` message arrives or
/// `auth_timeout_secs` elapses. Any other message received first is dropped
/// -- `auth` is the only accepted message before the handshake completes.
/// Returns `None` if the connection should close, or `Some` of the session
/// the client should be placed into (lazily created if none exists yet).
async fn await_auth(
    stream: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
    tx: &Outbox,
    client_id: ClientId,
    addr: SocketAddr,
) -> Option<Option<SessionId>> {
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(state.config.auth_timeout_secs.max(1)));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                tx.send(ServerMessage::AuthFail { reason: "authentication timed out".into() }).await;
                return None;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Auth { token, device }) => {
                                return finish_auth(state, tx, client_id, addr, token, device).await;
                            }
                            _ => {
                                state.clients.record_pre_auth_drop(client_id);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return None,
                }
            }
        }
    }
}

async fn finish_auth(
    state: &Arc<AppState>,
    tx: &Outbox,
    client_id: ClientId,
    addr: SocketAddr,
    token: Option<String>,
    device: DeviceInfo,
) -> Option<Option<SessionId>> {
    if state.is_auth_blocked(addr.ip()).await {
        tx.send(ServerMessage::AuthFail { reason: "too many failed attempts".into() }).await;
        return None;
    }

    let ok = match state.config.auth_token.as_deref() {
        None => true,
        Some(expected) => token
            .as_deref()
            .map(|t| super::auth::constant_time_eq(t.as_bytes(), expected.as_bytes()))
            .unwrap_or(false),
    };

    if !ok {
        state.record_auth_failure(addr.ip()).await;
        state.clients.mark_rejected(client_id);
        tx.send(ServerMessage::AuthFail { reason: "invalid token".into() }).await;
        return None;
    }

    state.record_auth_success(addr.ip()).await;
    state.clients.mark_authenticated(client_id, device);

    let default_session = match state.sessions.default_session() {
        Some(id) => Some(id),
        None => create_default_session(state).await,
    };

    let sessions: Vec<SessionSummary> =
        state.sessions.list().into_iter().filter_map(|id| state.sessions.get(id)).map(summarize).collect();
    let models: Vec<ModelSummary> = state
        .models
        .entries()
        .into_iter()
        .map(|(short, long)| ModelSummary { short_id: short.to_owned(), long_id: long.to_owned() })
        .collect();
    let connected_clients =
        default_session.map(|id| connected_clients_of(state, id)).unwrap_or_default();

    tx.send(ServerMessage::AuthOk {
        client_id,
        server_mode: "gateway".into(),
        server_version: env!("CARGO_PKG_VERSION").into(),
        connected_clients,
        sessions,
        models,
    })
    .await;
    Some(default_session)
}

/// Lazily spawn the first session a freshly authenticated client lands in,
/// when none exist yet.
async fn create_default_session(state: &Arc<AppState>) -> Option<SessionId> {
    match state
        .sessions
        .create(&state.config.agent_bin, &[], state.config.workdir.clone(), ModelId::new("sonnet"), PermissionMode::default())
        .await
    {
        Ok(entry) => {
            entry.set_state(SessionState::Ready);
            Some(entry.id)
        }
        Err(e) => {
            warn!(?e, "failed to lazily create the default session");
            None
        }
    }
}

fn connected_clients_of(state: &Arc<AppState>, session_id: SessionId) -> Vec<ConnectedClient> {
    state
        .clients
        .viewers_of(session_id)
        .into_iter()
        .filter_map(|(id, info)| info.device.map(|device| ConnectedClient { client_id: id, device }))
        .collect()
}

fn summarize(entry: Arc<SessionEntry>) -> SessionSummary {
    SessionSummary {
        session_id: entry.id,
        name: entry.name(),
        state: entry.state(),
        model: entry.model(),
        permission_mode: entry.permission_mode(),
        cwd: entry.cwd.display().to_string(),
    }
}

/// Per-connection state that outlives any single dispatched message: the
/// session currently being viewed, its fan-out subscription, accumulated
/// stream deltas awaiting their 50ms flush, and a permission-mode switch
/// awaiting the client's `confirmed` reply.
#[derive(Default)]
struct ConnectionState {
    viewing: Option<SessionId>,
    rx_session: Option<broadcast::Receiver<FanoutMessage>>,
    delta_buffer: HashMap<String, String>,
    pending_mode_confirmation: Option<PermissionMode>,
}

impl ConnectionState {
    async fn attach(&mut self, state: &Arc<AppState>, client_id: ClientId, tx: &Outbox, session_id: SessionId) -> bool {
        let Some(entry) = state.sessions.get(session_id) else {
            tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
            return false;
        };

        if let Some(previous) = self.viewing.take() {
            self.detach(state, client_id, previous).await;
        }

        state.clients.set_viewing_session(client_id, session_id);
        self.viewing = Some(session_id);
        self.rx_session = Some(entry.subscribe());
        self.delta_buffer.clear();

        let from_seq = entry.history.lock().await.oldest_seq().unwrap_or(0);
        tx.send(ServerMessage::HistoryReplayStart { session_id, from_seq }).await;
        let replay = entry.history.lock().await.replay_all();
        for item in replay {
            if let Some(message) = classify_history(session_id, &item.kind, Some(item.seq), item.payload) {
                tx.send(message).await;
            }
        }
        tx.send(ServerMessage::HistoryReplayEnd { session_id }).await;

        if let Some((request_id, payload)) = entry.pending_permission().await {
            tx.send(ServerMessage::PermissionRequest { session_id, request_id, payload }).await;
        }

        if entry.primary().is_none() {
            entry.set_primary(client_id);
            entry.broadcast_control(serde_json::json!({ "type": "primary_changed", "clientId": client_id }));
        }

        let device = state.clients.get(client_id).and_then(|info| info.device);
        entry.broadcast_control(serde_json::json!({
            "type": "client_joined",
            "clientId": client_id,
            "device": device,
        }));
        true
    }

    async fn detach(&mut self, state: &Arc<AppState>, client_id: ClientId, session_id: SessionId) {
        if let Some(entry) = state.sessions.get(session_id) {
            let had_primary = entry.primary() == Some(client_id);
            entry.release_primary(client_id);
            entry.broadcast_control(serde_json::json!({ "type": "client_left", "clientId": client_id }));
            if had_primary {
                entry.broadcast_control(serde_json::json!({ "type": "primary_changed", "clientId": Value::Null }));
            }
        }
    }

    /// Flush buffered stream deltas as individual `stream_delta` messages.
    /// Order between distinct `messageId`s does not matter; each targets an
    /// independent stream.
    async fn flush_deltas(&mut self, tx: &Outbox) {
        let Some(session_id) = self.viewing else { return };
        for (message_id, delta) in self.delta_buffer.drain() {
            tx.send(ServerMessage::StreamDelta { session_id, message_id, delta }).await;
        }
    }

    async fn forward_fanout(&mut self, tx: &Outbox, message: FanoutMessage) {
        let Some(session_id) = self.viewing else { return };
        match message {
            FanoutMessage::PermissionRequest { request_id, payload } => {
                self.flush_deltas(tx).await;
                tx.send(ServerMessage::PermissionRequest { session_id, request_id, payload }).await;
            }
            FanoutMessage::Event { seq, payload } => {
                let kind = payload.get("type").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
                if kind == "stream_delta" {
                    let message_id = payload.get("messageId").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
                    let delta = payload.get("delta").and_then(|v| v.as_str()).unwrap_or_default();
                    self.delta_buffer.entry(message_id).or_default().push_str(delta);
                    return;
                }
                // Any other kind must not be reordered ahead of deltas
                // already buffered for this session.
                self.flush_deltas(tx).await;
                if let Some(out) = classify_history(session_id, &kind, seq, payload) {
                    tx.send(out).await;
                }
            }
        }
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_owned()
}

/// Translate one recorded-or-live event into the `ServerMessage` a client
/// should see for it. Shared by history replay (always carries a `seq`) and
/// live fan-out (`seq` is `None` for events that are not recorded: stream
/// deltas and control broadcasts such as `client_joined`).
fn classify_history(session_id: SessionId, kind: &str, seq: Option<u64>, value: Value) -> Option<ServerMessage> {
    match kind {
        "user_input" | "assistant_response" => Some(ServerMessage::AgentEvent { session_id, seq, payload: value }),
        "tool_start" => {
            Some(ServerMessage::ToolStart { session_id, tool_use_id: str_field(&value, "toolUseId"), payload: value })
        }
        "user_question" => Some(ServerMessage::UserQuestion {
            session_id,
            question_id: str_field(&value, "questionId"),
            payload: value,
        }),
        "result" => Some(ServerMessage::TurnResult { session_id, payload: value }),
        "stream_start" => Some(ServerMessage::StreamStart { session_id, message_id: str_field(&value, "messageId") }),
        "stream_end" => Some(ServerMessage::StreamEnd { session_id, message_id: str_field(&value, "messageId") }),
        "permission_resolved" => {
            let request_id: PermissionRequestId = serde_json::from_value(value["requestId"].clone()).ok()?;
            let decision: PermissionDecision = serde_json::from_value(value["decision"].clone()).ok()?;
            let decided_by: ClientId = serde_json::from_value(value["decidedBy"].clone()).ok()?;
            Some(ServerMessage::PermissionResolved { session_id, request_id, decision, decided_by })
        }
        "client_joined" => {
            let client_id: ClientId = serde_json::from_value(value["clientId"].clone()).ok()?;
            let device: DeviceInfo = serde_json::from_value(value["device"].clone()).ok()?;
            Some(ServerMessage::ClientJoined { session_id, client: ConnectedClient { client_id, device } })
        }
        "client_left" => {
            let client_id: ClientId = serde_json::from_value(value["clientId"].clone()).ok()?;
            Some(ServerMessage::ClientLeft { session_id, client_id })
        }
        "primary_changed" => {
            let client_id: Option<ClientId> = serde_json::from_value(value["clientId"].clone()).ok();
            Some(ServerMessage::PrimaryChanged { session_id, client_id })
        }
        "permission_mode_changed" => {
            let mode: PermissionMode = serde_json::from_value(value["mode"].clone()).ok()?;
            Some(ServerMessage::PermissionModeChanged { session_id, mode })
        }
        "session_renamed" => Some(ServerMessage::SessionRenamed { session_id, name: str_field(&value, "name") }),
        "session_state_changed" => {
            let state: SessionState = serde_json::from_value(value["state"].clone()).ok()?;
            Some(ServerMessage::SessionStateChanged { session_id, state })
        }
        "model_changed" => {
            let model: ModelId = serde_json::from_value(value["model"].clone()).ok()?;
            Some(ServerMessage::ModelChanged { session_id, model })
        }
        _ => Some(ServerMessage::AgentEvent { session_id, seq, payload: value }),
    }
}

/// Parse and handle one inbound text frame after authentication. Returns
/// `false` if the connection should close.
async fn dispatch(
    text: &str,
    state: &Arc<AppState>,
    client_id: ClientId,
    tx: &Outbox,
    conn: &mut ConnectionState,
) -> bool {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tx.send(ServerMessage::Error { error: ErrorCode::UnknownType.to_error_body(format!("bad message: {e}")) })
                .await;
            return true;
        }
    };

    match msg {
        ClientMessage::Auth { .. } => {
            // Already authenticated; a second `auth` message is a no-op.
        }
        ClientMessage::Ping => tx.send(ServerMessage::Pong).await,
        ClientMessage::ListSessions => {
            let sessions =
                state.sessions.list().into_iter().filter_map(|id| state.sessions.get(id)).map(summarize).collect();
            tx.send(ServerMessage::SessionList { sessions }).await;
        }
        ClientMessage::ListDirectory { path } => handle_list_directory(state, tx, path).await,
        ClientMessage::CreateSession { cwd, model, permission_mode } => {
            handle_create_session(state, client_id, tx, conn, cwd, model, permission_mode).await;
        }
        ClientMessage::SwitchSession { session_id } => {
            conn.attach(state, client_id, tx, session_id).await;
        }
        ClientMessage::RenameSession { session_id, name } => handle_rename(state, tx, session_id, name).await,
        ClientMessage::Input { text } => handle_input(state, client_id, tx, conn, &text).await,
        ClientMessage::Interrupt => {
            handle_forward_current(state, tx, conn, &serde_json::json!({ "type": "interrupt" })).await;
        }
        ClientMessage::SetModel { model } => handle_set_model(state, tx, conn, model).await,
        ClientMessage::SetPermissionMode { mode } => handle_set_permission_mode(state, tx, conn, mode).await,
        ClientMessage::Confirmed { confirmed } => handle_confirmed(state, conn, confirmed).await,
        ClientMessage::PermissionResponse { request_id, decision } => {
            handle_permission_response(state, tx, client_id, request_id, decision).await;
        }
        ClientMessage::UserQuestionResponse { question_id, response } => {
            handle_forward_current(
                state,
                tx,
                conn,
                &serde_json::json!({ "type": "user_question_response", "questionId": question_id, "response": response }),
            )
            .await;
        }
        ClientMessage::DestroySession { session_id } => handle_destroy(state, tx, session_id).await,
    }
    true
}

/// While draining, only answers to prompts already in flight are honored --
/// a new turn must not start on a connection about to be closed.
async fn dispatch_while_draining(text: &str, tx: &Outbox) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::PermissionResponse { .. }) | Ok(ClientMessage::UserQuestionResponse { .. }) => true,
        _ => {
            tx.send(ServerMessage::Error { error: ErrorCode::Draining.to_error_body("gateway is draining") }).await;
            true
        }
    }
}

async fn handle_list_directory(state: &Arc<AppState>, tx: &Outbox, path: Option<String>) {
    let path = path.map(PathBuf::from).unwrap_or_else(|| state.config.workdir.clone());
    let mut read_dir = match tokio::fs::read_dir(&path).await {
        Ok(rd) => rd,
        Err(e) => {
            tx.send(ServerMessage::Error { error: ErrorCode::InvalidCwd.to_error_body(format!("{e}")) }).await;
            return;
        }
    };
    let mut entries = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push(DirectoryEntry { name: entry.file_name().to_string_lossy().into_owned(), is_dir });
    }
    tx.send(ServerMessage::DirectoryListing { path: path.display().to_string(), entries }).await;
}

async fn handle_create_session(
    state: &Arc<AppState>,
    client_id: ClientId,
    tx: &Outbox,
    conn: &mut ConnectionState,
    cwd: Option<String>,
    model: Option<ModelId>,
    permission_mode: Option<PermissionMode>,
) {
    let cwd = cwd.map(PathBuf::from).unwrap_or_else(|| state.config.workdir.clone());
    if !cwd.exists() {
        tx.send(ServerMessage::Error { error: ErrorCode::InvalidCwd.to_error_body("cwd does not exist") }).await;
        return;
    }

    let model = model.unwrap_or_else(|| ModelId::new("sonnet"));
    if !state.models.is_allowed(&model) {
        tx.send(ServerMessage::Error { error: ErrorCode::BadField.to_error_body("model not allowed") }).await;
        return;
    }

    let args: Vec<String> = Vec::new();
    match state.sessions.create(&state.config.agent_bin, &args, cwd, model, permission_mode.unwrap_or_default()).await
    {
        Ok(entry) => {
            entry.set_state(SessionState::Ready);
            tx.send(ServerMessage::SessionCreated { session: summarize(entry.clone()) }).await;
            conn.attach(state, client_id, tx, entry.id).await;
        }
        Err(CreateSessionError::MaxSessions) => {
            tx.send(ServerMessage::Error { error: ErrorCode::MaxSessions.to_error_body("maximum session count reached") })
                .await;
        }
    }
}

async fn handle_rename(state: &Arc<AppState>, tx: &Outbox, session_id: SessionId, name: String) {
    let Some(entry) = state.sessions.get(session_id) else {
        tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
        return;
    };
    entry.rename(name.clone());
    entry.broadcast_control(serde_json::json!({ "type": "session_renamed", "name": name }));
}

async fn handle_input(state: &Arc<AppState>, client_id: ClientId, tx: &Outbox, conn: &ConnectionState, text: &str) {
    let Some(session_id) = conn.viewing else {
        tx.send(ServerMessage::Error { error: ErrorCode::NotReady.to_error_body("no session is being viewed") }).await;
        return;
    };
    let Some(entry) = state.sessions.get(session_id) else {
        tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
        return;
    };
    entry.record_user_input(client_id, text).await;
    let line = serde_json::json!({ "type": "user_input", "text": text }).to_string();
    if let Err(e) = entry.send_line(&line).await {
        warn!(%session_id, error = %e, "failed to forward input to agent");
        tx.send(ServerMessage::Error { error: ErrorCode::Crashed.to_error_body("agent unavailable") }).await;
    }
}

async fn handle_forward_current(state: &Arc<AppState>, tx: &Outbox, conn: &ConnectionState, payload: &Value) {
    let Some(session_id) = conn.viewing else {
        tx.send(ServerMessage::Error { error: ErrorCode::NotReady.to_error_body("no session is being viewed") }).await;
        return;
    };
    let Some(entry) = state.sessions.get(session_id) else {
        tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
        return;
    };
    if let Err(e) = entry.send_line(&payload.to_string()).await {
        warn!(%session_id, error = %e, "failed to forward line to agent");
        tx.send(ServerMessage::Error { error: ErrorCode::Crashed.to_error_body("agent unavailable") }).await;
    }
}

async fn handle_set_model(state: &Arc<AppState>, tx: &Outbox, conn: &ConnectionState, model: ModelId) {
    let Some(session_id) = conn.viewing else { return };
    let Some(entry) = state.sessions.get(session_id) else {
        tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
        return;
    };
    if !state.models.is_allowed(&model) {
        tx.send(ServerMessage::Error { error: ErrorCode::BadField.to_error_body("model not allowed") }).await;
        return;
    }
    entry.set_model(model.clone());
    entry.broadcast_control(serde_json::json!({ "type": "model_changed", "model": model }));
}

/// `plan`/`approve` apply immediately; switching into `auto` requires the
/// client to confirm the prompt the gateway sends back before it takes
/// effect.
async fn handle_set_permission_mode(state: &Arc<AppState>, tx: &Outbox, conn: &mut ConnectionState, mode: PermissionMode) {
    let Some(session_id) = conn.viewing else { return };
    let Some(entry) = state.sessions.get(session_id) else {
        tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
        return;
    };
    if mode == PermissionMode::Auto {
        conn.pending_mode_confirmation = Some(mode);
        tx.send(ServerMessage::ConfirmPermissionMode { session_id, mode }).await;
        return;
    }
    entry.set_permission_mode(mode);
    entry.broadcast_control(serde_json::json!({ "type": "permission_mode_changed", "mode": mode }));
}

async fn handle_confirmed(state: &Arc<AppState>, conn: &mut ConnectionState, confirmed: bool) {
    let Some(mode) = conn.pending_mode_confirmation.take() else { return };
    let Some(session_id) = conn.viewing else { return };
    if !confirmed {
        return;
    }
    if let Some(entry) = state.sessions.get(session_id) {
        entry.set_permission_mode(mode);
        entry.broadcast_control(serde_json::json!({ "type": "permission_mode_changed", "mode": mode }));
    }
}

async fn handle_permission_response(
    state: &Arc<AppState>,
    tx: &Outbox,
    client_id: ClientId,
    request_id: PermissionRequestId,
    decision: PermissionDecision,
) {
    for session_id in state.sessions.list() {
        if let Some(entry) = state.sessions.get(session_id) {
            match entry.permission_bridge.resolve(request_id, decision, client_id) {
                Ok(()) => return,
                Err(ResolveError::NotPending) => continue,
            }
        }
    }
    tx.send(ServerMessage::Error { error: ErrorCode::PermissionCancelled.to_error_body("request is not pending") })
        .await;
}

async fn handle_destroy(state: &Arc<AppState>, tx: &Outbox, session_id: SessionId) {
    match state.sessions.destroy(session_id, false).await {
        Ok(()) => tx.send(ServerMessage::SessionDestroyed { session_id }).await,
        Err(DestroySessionError::NotFound) => {
            tx.send(ServerMessage::Error { error: ErrorCode::SessionNotFound.to_error_body("no such session") }).await;
        }
        Err(DestroySessionError::LastSession) => {
            tx.send(ServerMessage::Error {
                error: ErrorCode::LastSession.to_error_body("cannot destroy the last session"),
            })
            .await;
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
