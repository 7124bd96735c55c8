// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

/// Constant-time comparison of two byte strings, used for all token checks
/// so a timing side-channel can't leak how much of the token matched.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Validate a bearer token carried in the `Authorization` header of a plain
/// HTTP request (the `/healthz`, `/sessions`, and `/permission` surface).
/// WebSocket clients authenticate in-band with an `auth` message instead --
/// see `ws::await_auth`.
pub fn validate_bearer(headers: &HeaderMap, expected: &str) -> bool {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    constant_time_eq(token.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
