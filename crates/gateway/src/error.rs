// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified error taxonomy shared across the WebSocket and HTTP surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Auth
    InvalidToken,
    RateLimited,
    AuthTimeout,
    // Protocol
    UnknownType,
    BadField,
    Oversized,
    // Session
    SessionNotFound,
    LastSession,
    MaxSessions,
    InvalidCwd,
    NotReady,
    // Agent
    Crashed,
    AgentProtocol,
    ModelChangeTimeout,
    InterruptFailed,
    // Permission
    PermissionTimeout,
    PermissionCancelled,
    // Transport
    PingMissed,
    Draining,
    ShuttingDown,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidToken | Self::AuthTimeout => 401,
            Self::RateLimited => 429,
            Self::UnknownType | Self::BadField => 400,
            Self::Oversized => 413,
            Self::SessionNotFound => 404,
            Self::LastSession | Self::MaxSessions | Self::NotReady => 409,
            Self::InvalidCwd => 400,
            Self::Crashed | Self::AgentProtocol => 500,
            Self::ModelChangeTimeout => 504,
            Self::InterruptFailed => 409,
            Self::PermissionTimeout | Self::PermissionCancelled => 408,
            Self::PingMissed => 408,
            Self::Draining | Self::ShuttingDown => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::RateLimited => "rate_limited",
            Self::AuthTimeout => "timeout",
            Self::UnknownType => "unknown_type",
            Self::BadField => "bad_field",
            Self::Oversized => "oversized",
            Self::SessionNotFound => "not_found",
            Self::LastSession => "last_session",
            Self::MaxSessions => "max_sessions",
            Self::InvalidCwd => "invalid_cwd",
            Self::NotReady => "not_ready",
            Self::Crashed => "crashed",
            Self::AgentProtocol => "protocol",
            Self::ModelChangeTimeout => "model_change_timeout",
            Self::InterruptFailed => "interrupt_failed",
            Self::PermissionTimeout => "timeout",
            Self::PermissionCancelled => "cancelled",
            Self::PingMissed => "ping_missed",
            Self::Draining => "draining",
            Self::ShuttingDown => "shutting_down",
            Self::Internal => "internal",
        }
    }

    /// Build the `{ error: { code, message } }` envelope used on both the
    /// HTTP and WebSocket surfaces.
    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body containing a machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Top-level error response envelope shared across HTTP and WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
