// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chroxy_specs::ChroxyBuilder;

#[tokio::test]
async fn create_session_then_input_streams_back_immediately() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client.send(serde_json::json!({ "type": "create_session" })).await.expect("create_session");
    let created = client.recv_timeout(Duration::from_secs(2)).await.expect("session_created");
    assert_eq!(created["type"], "session_created");

    // create_session attaches the creating client to the new session, so
    // history replay brackets (empty, for a freshly created session) follow
    // immediately.
    let start = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    assert_eq!(start["type"], "history_replay_start");
    let end = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_end");
    assert_eq!(end["type"], "history_replay_end");

    client.send(serde_json::json!({ "type": "input", "text": "hello there" })).await.expect("input");

    // The input is recorded (and broadcast) as soon as it is accepted, then
    // forwarded to the agent -- whose stub here is `/bin/cat`, so the same
    // line also comes back as a second, unrecorded event once it echoes.
    let recorded = client.recv_timeout(Duration::from_secs(2)).await.expect("agent_event");
    assert_eq!(recorded["type"], "agent_event");
    assert_eq!(recorded["payload"]["type"], "user_input");
    assert_eq!(recorded["payload"]["text"], "hello there");

    let echoed = client.recv_timeout(Duration::from_secs(2)).await.expect("echoed agent_event");
    assert_eq!(echoed["payload"]["text"], "hello there");
}

#[tokio::test]
async fn max_sessions_is_enforced() {
    let gateway = ChroxyBuilder::new().max_sessions(1).spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client.send(serde_json::json!({ "type": "create_session" })).await.expect("first create");
    let first = client.recv_timeout(Duration::from_secs(2)).await.expect("first session_created");
    assert_eq!(first["type"], "session_created");
    let _start = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    let _end = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_end");

    client.send(serde_json::json!({ "type": "create_session" })).await.expect("second create");
    let second = client.recv_timeout(Duration::from_secs(2)).await.expect("max_sessions error");
    assert_eq!(second["type"], "error");
    assert_eq!(second["error"]["code"], "max_sessions");
}

#[tokio::test]
async fn switching_to_an_unknown_session_returns_not_found() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client
        .send(serde_json::json!({
            "type": "switch_session",
            "sessionId": "00000000-0000-0000-0000-000000000000",
        }))
        .await
        .expect("switch_session");
    let reply = client.recv_timeout(Duration::from_secs(2)).await.expect("error reply");
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], "not_found");
}

#[tokio::test]
async fn destroying_unknown_session_returns_not_found() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client
        .send(serde_json::json!({
            "type": "destroy_session",
            "sessionId": "00000000-0000-0000-0000-000000000000",
        }))
        .await
        .expect("destroy_session");
    let reply = client.recv_timeout(Duration::from_secs(2)).await.expect("error reply");
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], "not_found");
}

#[tokio::test]
async fn renaming_a_session_broadcasts_to_the_renaming_client() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client.send(serde_json::json!({ "type": "create_session" })).await.expect("create_session");
    let created = client.recv_timeout(Duration::from_secs(2)).await.expect("session_created");
    let session_id = created["session"]["sessionId"].clone();
    let _start = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    let _end = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_end");

    client
        .send(serde_json::json!({
            "type": "rename_session",
            "sessionId": session_id,
            "name": "renamed",
        }))
        .await
        .expect("rename_session");

    let renamed = client.recv_timeout(Duration::from_secs(2)).await.expect("session_renamed");
    assert_eq!(renamed["type"], "session_renamed");
    assert_eq!(renamed["name"], "renamed");
}
