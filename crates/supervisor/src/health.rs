// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use nix::sys::signal;
use nix::unistd::Pid;
use tokio::net::TcpStream;

/// Whether the process identified by `pid` is still alive, probed with a
/// zero-signal `kill(2)` call that has no effect beyond checking existence
/// and permission.
pub fn process_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Whether something is accepting connections on `addr`, used as a coarse
/// liveness signal for the gateway's listener independent of the process
/// table (a hung-but-alive process that stopped accepting connections is
/// still a failure worth restarting).
pub async fn port_is_accepting(addr: &str, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
