// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::types::{ClientId, PermissionDecision, PermissionRequestId};

/// Bridges a permission prompt raised by the agent process to whichever
/// client answers it first, and times the prompt out if no client answers.
///
/// Requests are correlated by [`PermissionRequestId`] through a one-shot
/// channel: the agent-facing side registers a request and awaits the
/// receiver, the client-facing side resolves it by id once a decision
/// arrives over the WebSocket. The winning client's id travels with the
/// decision so every viewer -- including the ones that lost the race -- can
/// be told who decided.
#[derive(Default)]
pub struct PermissionBridge {
    pending: Mutex<HashMap<PermissionRequestId, oneshot::Sender<(PermissionDecision, ClientId)>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// No request with this id is pending (already resolved, timed out, or
    /// never existed).
    NotPending,
}

/// The 5-minute window a permission prompt waits for a client decision
/// before resolving to a conservative denial.
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(300);

impl PermissionBridge {
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    /// Register a new pending request and return a future that resolves once
    /// a decision is submitted, or `None` if `timeout` elapses first. If the
    /// timeout elapses, the request is removed from the pending table so a
    /// late decision is rejected rather than silently ignored.
    pub async fn wait_for_decision(
        &self,
        id: PermissionRequestId,
        timeout: Duration,
    ) -> Option<(PermissionDecision, ClientId)> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(id, tx);
        }

        let result = tokio::time::timeout(timeout, rx).await;
        match result {
            Ok(Ok(decision)) => Some(decision),
            Ok(Err(_)) => None,
            Err(_) => {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.remove(&id);
                None
            }
        }
    }

    /// Resolve a pending request with the client's decision. The first
    /// caller wins; every later call for the same id returns
    /// `NotPending`, matching the multi-client arbitration rule that exactly
    /// one decision is ever recorded per request.
    pub fn resolve(
        &self,
        id: PermissionRequestId,
        decision: PermissionDecision,
        decided_by: ClientId,
    ) -> Result<(), ResolveError> {
        let sender = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&id)
        };
        match sender {
            Some(tx) => {
                // Ignore a dropped receiver: the waiter already timed out and
                // removed itself, which races harmlessly with this resolve.
                let _ = tx.send((decision.normalize(), decided_by));
                Ok(())
            }
            None => Err(ResolveError::NotPending),
        }
    }

    /// Cancel every pending request, e.g. when the owning session is torn
    /// down while a permission prompt is still outstanding.
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
#[path = "permission_tests.rs"]
mod tests;
