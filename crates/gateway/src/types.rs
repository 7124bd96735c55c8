// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for an agent session, assigned by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a connected WebSocket client, scoped to the
/// lifetime of the gateway process (not persisted across restarts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for an in-flight permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRequestId(Uuid);

impl PermissionRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PermissionRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PermissionRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decision a client may return for a pending permission request.
///
/// `AllowAlways` is accepted on the wire for compatibility with clients that
/// offer a "don't ask again" affordance, but the gateway coerces it to
/// `Allow` for the current request only -- it carries no persistence
/// semantics here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    AllowAlways,
    Deny,
}

impl PermissionDecision {
    /// Normalize the decision as the agent process should see it: `AllowAlways`
    /// is downgraded to a one-shot `Allow`.
    pub fn normalize(self) -> Self {
        match self {
            Self::AllowAlways => Self::Allow,
            other => other,
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, Self::Allow | Self::AllowAlways)
    }
}

/// Permission posture an agent session runs under.
///
/// `Auto` skips permission prompts entirely once confirmed by the client
/// that requested it (see the gateway's `set_permission_mode` handshake);
/// switching into it is never silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Approve,
    Auto,
    Plan,
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::Approve
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Auto => "auto",
            Self::Plan => "plan",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of an agent session as observed by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Ready,
    Busy,
    AwaitingPermission,
    Crashed,
    Draining,
    Closed,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
