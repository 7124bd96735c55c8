// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;

use serde_json::Value;

/// A single recorded wire event, tagged with a monotonically increasing
/// sequence number scoped to its session and the kind of entry it is
/// (`user_input`, `assistant_response`, `tool_start`, `user_question`, or
/// `result`).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub seq: u64,
    pub kind: String,
    pub payload: Value,
}

/// Bounded, append-only log of server-to-client events for one session.
///
/// Used to replay the tail of a session's output to a client that
/// reconnects, without requiring the agent process itself to buffer or
/// replay anything. Once `capacity` entries have been recorded, the oldest
/// entries are dropped -- a reconnecting client that lags behind the
/// retained window gets a `from_seq` capped at the oldest entry still held.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
    next_seq: u64,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::new(), next_seq: 0 }
    }

    /// Append `payload` as the next event of the given `kind`, returning its
    /// assigned sequence number.
    pub fn push(&mut self, kind: &str, payload: Value) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(HistoryEntry { seq, kind: kind.to_owned(), payload });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        seq
    }

    /// Return all entries with `seq > from_seq`, oldest first. If `from_seq`
    /// is older than the oldest retained entry, replay starts from the
    /// oldest entry still held (the gap itself is not represented -- callers
    /// that need to detect a gap should compare against [`Self::oldest_seq`]).
    pub fn replay_since(&self, from_seq: u64) -> Vec<HistoryEntry> {
        self.entries.iter().filter(|e| e.seq > from_seq).cloned().collect()
    }

    /// Sequence number of the oldest entry still retained, if any.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.entries.front().map(|e| e.seq)
    }

    /// Every entry currently retained, oldest first. Used for a fresh
    /// client's initial replay, where `replay_since` can't express "from the
    /// very beginning" once sequence numbers start at 0.
    pub fn replay_all(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Sequence number that would be assigned to the next pushed entry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
