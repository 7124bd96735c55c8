// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chroxy_specs::ChroxyBuilder;

#[tokio::test]
async fn switching_back_into_a_session_replays_its_full_history() {
    let gateway = ChroxyBuilder::new().spawn().await.expect("gateway should start");
    let mut first = gateway.connect().await.expect("first connection");

    first.send(serde_json::json!({ "type": "create_session" })).await.expect("create_session");
    let created = first.recv_timeout(Duration::from_secs(2)).await.expect("session_created");
    let session_id = created["session"]["sessionId"].clone();
    let start = first.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    assert_eq!(start["fromSeq"], 0);
    let _end = first.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_end");

    for i in 0..3 {
        first
            .send(serde_json::json!({ "type": "input", "text": format!("message {i}") }))
            .await
            .expect("input");
        // The recorded broadcast arrives first; `/bin/cat` then echoes the
        // same line back as a second, unrecorded event.
        let recorded = first.recv_timeout(Duration::from_secs(2)).await.expect("agent_event");
        assert_eq!(recorded["payload"]["text"], format!("message {i}"));
        let _echoed = first.recv_timeout(Duration::from_secs(2)).await.expect("echoed agent_event");
    }

    first.close().await.expect("close first connection");

    let mut second = gateway.connect().await.expect("second connection");
    second
        .send(serde_json::json!({ "type": "switch_session", "sessionId": session_id }))
        .await
        .expect("switch_session");

    let start2 = second.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    assert_eq!(start2["type"], "history_replay_start");

    let mut replayed = Vec::new();
    loop {
        let msg = second.recv_timeout(Duration::from_secs(2)).await.expect("replay event");
        if msg["type"] == "history_replay_end" {
            break;
        }
        replayed.push(msg);
    }

    assert_eq!(replayed.len(), 3);
    for (i, entry) in replayed.iter().enumerate() {
        assert_eq!(entry["payload"]["text"], format!("message {i}"));
    }
}
