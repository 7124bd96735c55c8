// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors raised by the supervisor while managing the gateway child process.
#[derive(Debug)]
pub enum SupervisorError {
    Spawn(std::io::Error),
    PidfileWrite(std::io::Error),
    HealthCheck(String),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn gateway process: {e}"),
            Self::PidfileWrite(e) => write!(f, "failed to write pidfile: {e}"),
            Self::HealthCheck(msg) => write!(f, "health check failed: {msg}"),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) | Self::PidfileWrite(e) => Some(e),
            Self::HealthCheck(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
