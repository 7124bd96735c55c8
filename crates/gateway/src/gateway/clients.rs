// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::types::{ClientId, SessionId};

/// Where a connecting client is in the authentication handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Authenticated,
    Rejected,
}

/// Client-supplied identification sent with the `auth` message, surfaced
/// back in `client_joined`/`auth_ok.connectedClients` so viewers can tell
/// devices apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub platform: String,
}

/// Metadata the gateway keeps about a connected client, independent of
/// whatever session it is currently viewing.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub remote_ip: IpAddr,
    pub connected_at: Instant,
    pub auth_state: AuthState,
    pub device: Option<DeviceInfo>,
    pub viewing_session: Option<SessionId>,
    /// Messages received and dropped before authentication completed.
    pub pre_auth_drops: u32,
}

impl ClientInfo {
    fn new(remote_ip: IpAddr, connected_at: Instant) -> Self {
        Self {
            remote_ip,
            connected_at,
            auth_state: AuthState::Pending,
            device: None,
            viewing_session: None,
            pre_auth_drops: 0,
        }
    }
}

/// Registry of currently-connected WebSocket clients, used for fan-out
/// bookkeeping, the single-viewing-session-per-client model, and
/// observability (`auth_ok.connectedClients`, `client_joined`/`client_left`).
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientInfo>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ClientId, remote_ip: IpAddr, connected_at: Instant) {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, ClientInfo::new(remote_ip, connected_at));
    }

    pub fn unregister(&self, id: ClientId) {
        self.clients.write().unwrap_or_else(|e| e.into_inner()).remove(&id);
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    /// Mark `id` authenticated and record the device info it announced.
    pub fn mark_authenticated(&self, id: ClientId, device: DeviceInfo) {
        if let Some(info) = self.clients.write().unwrap_or_else(|e| e.into_inner()).get_mut(&id) {
            info.auth_state = AuthState::Authenticated;
            info.device = Some(device);
        }
    }

    pub fn mark_rejected(&self, id: ClientId) {
        if let Some(info) = self.clients.write().unwrap_or_else(|e| e.into_inner()).get_mut(&id) {
            info.auth_state = AuthState::Rejected;
        }
    }

    pub fn auth_state(&self, id: ClientId) -> Option<AuthState> {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).get(&id).map(|i| i.auth_state)
    }

    /// Count a message dropped because it arrived before authentication
    /// completed.
    pub fn record_pre_auth_drop(&self, id: ClientId) -> u32 {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        match clients.get_mut(&id) {
            Some(info) => {
                info.pre_auth_drops += 1;
                info.pre_auth_drops
            }
            None => 0,
        }
    }

    pub fn set_viewing_session(&self, id: ClientId, session: SessionId) {
        if let Some(info) = self.clients.write().unwrap_or_else(|e| e.into_inner()).get_mut(&id) {
            info.viewing_session = Some(session);
        }
    }

    pub fn viewing_session(&self, id: ClientId) -> Option<SessionId> {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).get(&id).and_then(|i| i.viewing_session)
    }

    /// Snapshot of every authenticated client currently viewing `session`,
    /// for the `connectedClients` list in `auth_ok` and for broadcasting
    /// `client_joined`/`client_left`.
    pub fn viewers_of(&self, session: SessionId) -> Vec<(ClientId, ClientInfo)> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, info)| {
                info.auth_state == AuthState::Authenticated && info.viewing_session == Some(session)
            })
            .map(|(id, info)| (*id, info.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "clients_tests.rs"]
mod tests;
