// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

const COOLDOWN_CAP: Duration = Duration::from_secs(300);

/// An IP address's standing after repeated authentication failures: the
/// count behind the current backoff, and the instant the backoff expires
/// (`None` once it has elapsed or no cooldown is active).
#[derive(Debug, Clone, Copy)]
struct AuthCooldown {
    until: Option<Instant>,
    failures: u32,
}

/// Sliding-window rate limiter keyed by client IP address.
///
/// Each key tracks request timestamps within the current window; requests
/// older than the window are pruned lazily on the next check for that key.
/// This is intentionally per-IP: clients behind a shared NAT share a budget,
/// which is an accepted tradeoff rather than a bug.
///
/// Also tracks a separate per-IP authentication-failure cooldown: more than
/// `max_requests` failed `auth` messages inside `window` escalates into an
/// exponential backoff (2^failures seconds, capped at 5 minutes) rather than
/// a flat per-window rejection, since a brute-force token guesser should get
/// slower, not just bounded.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: HashMap<IpAddr, Vec<Instant>>,
    cooldowns: HashMap<IpAddr, AuthCooldown>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self { window, max_requests, buckets: HashMap::new(), cooldowns: HashMap::new() }
    }

    /// Record a request attempt for `key` at `now` and report whether it is
    /// allowed under the configured window/limit.
    pub fn check(&mut self, key: IpAddr, now: Instant) -> bool {
        let window = self.window;
        let entry = self.buckets.entry(key).or_default();
        entry.retain(|t| now.duration_since(*t) < window);
        if entry.len() as u32 >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drop buckets that have gone fully idle, bounding memory growth for
    /// long-lived gateways with many transient clients.
    pub fn sweep(&mut self, now: Instant) {
        let window = self.window;
        self.buckets.retain(|_, hits| {
            hits.retain(|t| now.duration_since(*t) < window);
            !hits.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether `key` is currently serving out an authentication cooldown.
    pub fn is_cooling_down(&self, key: IpAddr, now: Instant) -> bool {
        match self.cooldowns.get(&key) {
            Some(cooldown) => cooldown.until.is_some_and(|until| now < until),
            None => false,
        }
    }

    /// Record a failed `auth` attempt from `key`. Once more than
    /// `max_requests` failures land within `window`, escalates an
    /// exponential cooldown (2^failures seconds, capped at 5 minutes).
    pub fn record_auth_failure(&mut self, key: IpAddr, now: Instant) {
        let within_budget = self.check(key, now);
        let cooldown = self.cooldowns.entry(key).or_insert(AuthCooldown { until: None, failures: 0 });
        if within_budget {
            return;
        }
        cooldown.failures = cooldown.failures.saturating_add(1);
        let backoff = Duration::from_secs(1u64.saturating_shl(cooldown.failures.min(63)));
        cooldown.until = Some(now + backoff.min(COOLDOWN_CAP));
    }

    /// Clear `key`'s cooldown state after a successful authentication.
    pub fn record_auth_success(&mut self, key: IpAddr) {
        self.cooldowns.remove(&key);
    }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
