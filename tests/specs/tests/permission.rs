// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use chroxy_specs::ChroxyBuilder;

/// A stub agent that immediately raises a permission prompt, then echoes
/// back anything written to its stdin (so the permission response the
/// gateway writes becomes observable as a regular agent event).
fn permission_prompting_stub() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stub-agent.sh");
    let mut file = std::fs::File::create(&path).expect("create stub");
    writeln!(
        file,
        "#!/bin/sh\necho '{{\"type\":\"permission_request\",\"payload\":{{\"tool\":\"bash\",\"cmd\":\"rm -rf /\"}}}}'\nexec cat"
    )
    .expect("write stub");
    let mut perms = file.metadata().expect("stat stub").permissions();
    perms.set_mode(0o700);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    (dir, path)
}

#[tokio::test]
async fn client_can_answer_a_permission_prompt_raised_by_the_agent() {
    let (_dir, stub) = permission_prompting_stub();
    let gateway = ChroxyBuilder::new().agent_bin(stub).spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client.send(serde_json::json!({ "type": "create_session" })).await.expect("create_session");
    let _created = client.recv_timeout(Duration::from_secs(2)).await.expect("session_created");
    let _start = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    let _end = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_end");

    let prompt = client.recv_timeout(Duration::from_secs(2)).await.expect("permission_request");
    assert_eq!(prompt["type"], "permission_request");
    assert_eq!(prompt["payload"]["tool"], "bash");
    let request_id = prompt["requestId"].clone();

    client
        .send(serde_json::json!({
            "type": "permission_response",
            "requestId": request_id,
            "decision": "allow",
        }))
        .await
        .expect("permission_response");

    let resolved = client.recv_timeout(Duration::from_secs(2)).await.expect("permission_resolved");
    assert_eq!(resolved["type"], "permission_resolved");
    assert_eq!(resolved["decision"], "allow");
    assert!(resolved["decidedBy"].is_string());

    // The stub echoes the permission_response the gateway wrote to its
    // stdin back out as a regular stdout line.
    let echoed = client.recv_timeout(Duration::from_secs(2)).await.expect("echoed response");
    assert_eq!(echoed["type"], "agent_event");
    assert_eq!(echoed["payload"]["type"], "permission_response");
    assert_eq!(echoed["payload"]["decision"], "allow");
}

#[tokio::test]
async fn unanswered_permission_prompt_stays_pending_within_the_test_window() {
    let (_dir, stub) = permission_prompting_stub();
    let gateway = ChroxyBuilder::new().agent_bin(stub).spawn().await.expect("gateway should start");
    let mut client = gateway.connect().await.expect("connect");

    client.send(serde_json::json!({ "type": "create_session" })).await.expect("create_session");
    let _created = client.recv_timeout(Duration::from_secs(2)).await.expect("session_created");
    let _start = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_start");
    let _end = client.recv_timeout(Duration::from_secs(2)).await.expect("history_replay_end");

    let prompt = client.recv_timeout(Duration::from_secs(2)).await.expect("permission_request");
    assert_eq!(prompt["type"], "permission_request");

    // Deliberately do not answer; the gateway's own prompt timeout is five
    // minutes, far longer than a test should wait, so this only asserts the
    // prompt stays pending rather than resolving itself immediately.
    let immediate = client.recv_timeout(Duration::from_millis(200)).await;
    assert!(immediate.is_err(), "prompt should not resolve on its own within the test window");
}
