// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chroxy_specs::ChroxyBuilder;

#[tokio::test]
async fn loopback_client_authenticates_without_a_token_when_none_is_configured() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect and auth without token");
    client.send(serde_json::json!({ "type": "ping" })).await.expect("send ping");
    let reply = client.recv_timeout(Duration::from_secs(2)).await.expect("pong");
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn connection_with_correct_token_is_accepted() {
    let gateway = ChroxyBuilder::new().auth_token("s3cr3t").spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect with configured token");
    client.send(serde_json::json!({ "type": "list_sessions" })).await.expect("send list_sessions");
    let reply = client.recv_timeout(Duration::from_secs(2)).await.expect("session list");
    assert_eq!(reply["type"], "session_list");
}

#[tokio::test]
async fn connection_with_wrong_token_is_rejected_in_band() {
    let gateway = ChroxyBuilder::new().auth_token("s3cr3t").spawn().await.expect("gateway should start");
    let (_client, reply) =
        gateway.connect_with_token("totally-wrong").await.expect("connect and send auth");
    assert_eq!(reply["type"], "auth_fail");
}

#[tokio::test]
async fn messages_sent_before_auth_are_dropped_not_acted_on() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut client = gateway.connect_unauthenticated().await.expect("connect");

    // Sent before the `auth` message; the gateway must drop this silently
    // rather than treat it as a valid `ping`.
    client.send(serde_json::json!({ "type": "ping" })).await.expect("send pre-auth ping");

    client.auth(None).await.expect("auth should still succeed afterward");

    client.send(serde_json::json!({ "type": "ping" })).await.expect("send post-auth ping");
    let reply = client.recv_timeout(Duration::from_secs(2)).await.expect("pong");
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn connection_that_never_authenticates_is_closed_after_the_auth_timeout() {
    let gateway =
        ChroxyBuilder::new().auth_timeout_secs(1).spawn().await.expect("gateway should start");
    let mut client = gateway.connect_unauthenticated().await.expect("connect");

    let outcome = client.recv_timeout(Duration::from_secs(3)).await;
    assert!(outcome.is_err(), "connection should be closed, not yield a message");
}
