#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;
use std::time::Duration;

use super::*;

#[tokio::test]
async fn spawn_and_echo_line_round_trips() {
    let bin = PathBuf::from("/bin/cat");
    let cwd = PathBuf::from(".");
    let mut handle = AgentHandle::spawn(&bin, &[], &cwd).await.expect("spawn cat");

    handle.send_line("{\"hello\":1}").await.expect("write line");

    let event = tokio::time::timeout(Duration::from_secs(2), handle.recv())
        .await
        .expect("recv timed out")
        .expect("channel closed");

    match event {
        AgentEvent::Line(value) => assert_eq!(value["hello"], 1),
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown(Duration::from_millis(500)).await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_terminates_a_long_running_process() {
    let bin = PathBuf::from("/bin/sleep");
    let cwd = PathBuf::from(".");
    let mut handle =
        AgentHandle::spawn(&bin, &["30".to_string()], &cwd).await.expect("spawn sleep");

    assert!(handle.is_alive());
    handle.shutdown(Duration::from_millis(500)).await.expect("shutdown");
    assert!(!handle.is_alive());
}

#[tokio::test]
async fn malformed_stdout_line_is_surfaced_distinctly() {
    let bin = PathBuf::from("/bin/echo");
    let cwd = PathBuf::from(".");
    let mut handle =
        AgentHandle::spawn(&bin, &["not json".to_string()], &cwd).await.expect("spawn echo");

    let event = tokio::time::timeout(Duration::from_secs(2), handle.recv())
        .await
        .expect("recv timed out")
        .expect("channel closed");

    assert!(matches!(event, AgentEvent::MalformedLine(_)));
}
