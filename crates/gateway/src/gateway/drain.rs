// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::watch;

/// Coordinates graceful shutdown: once draining starts, new WebSocket
/// upgrades are refused with `draining` and existing connections are told to
/// wind down, but in-flight agent turns are allowed to finish.
pub struct DrainState {
    tx: watch::Sender<bool>,
}

impl Default for DrainState {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn is_draining(&self) -> bool {
        *self.tx.borrow()
    }

    /// Begin draining and wake every task waiting on [`Self::wait`].
    pub fn begin(&self) {
        let _ = self.tx.send(true);
    }

    /// Resolve once draining has begun; a connection handler can `select!`
    /// on this alongside its normal read loop to notice the transition.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

#[cfg(test)]
#[path = "drain_tests.rs"]
mod tests;
