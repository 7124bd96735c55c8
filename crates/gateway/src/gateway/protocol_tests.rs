#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::json;

use super::*;

#[test]
fn auth_parses_with_optional_token() {
    let raw = json!({
        "type": "auth",
        "token": "secret",
        "device": {"id": "d1", "name": "laptop", "platform": "macos"},
    });
    let msg: ClientMessage = serde_json::from_value(raw).unwrap();
    match msg {
        ClientMessage::Auth { token, device } => {
            assert_eq!(token.as_deref(), Some("secret"));
            assert_eq!(device.id, "d1");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn create_session_parses_with_defaults_omitted() {
    let raw = json!({"type": "create_session"});
    let msg: ClientMessage = serde_json::from_value(raw).unwrap();
    match msg {
        ClientMessage::CreateSession { cwd, model, permission_mode } => {
            assert!(cwd.is_none());
            assert!(model.is_none());
            assert!(permission_mode.is_none());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn input_carries_plain_text_for_the_viewing_session() {
    let raw = json!({"type": "input", "text": "hi"});
    let msg: ClientMessage = serde_json::from_value(raw).unwrap();
    assert!(matches!(msg, ClientMessage::Input { text } if text == "hi"));
}

#[test]
fn attach_and_detach_and_prompt_types_no_longer_parse() {
    for ty in ["attach_session", "detach_session", "prompt"] {
        let raw = json!({"type": ty, "session_id": SessionId::new()});
        let result: Result<ClientMessage, _> = serde_json::from_value(raw);
        assert!(result.is_err(), "{ty} should not parse");
    }
}

#[test]
fn unknown_type_fails_to_parse() {
    let raw = json!({"type": "not_a_real_type"});
    let result: Result<ClientMessage, _> = serde_json::from_value(raw);
    assert!(result.is_err());
}

#[test]
fn permission_response_round_trips_allow_always() {
    let raw = json!({
        "type": "permission_response",
        "requestId": PermissionRequestId::new(),
        "decision": "allow_always",
    });
    let msg: ClientMessage = serde_json::from_value(raw).unwrap();
    match msg {
        ClientMessage::PermissionResponse { decision, .. } => {
            assert_eq!(decision, PermissionDecision::AllowAlways);
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn user_question_response_parses() {
    let raw = json!({"type": "user_question_response", "questionId": "q1", "response": "yes"});
    let msg: ClientMessage = serde_json::from_value(raw).unwrap();
    assert!(matches!(msg, ClientMessage::UserQuestionResponse { .. }));
}

#[test]
fn switch_session_and_rename_session_and_list_directory_parse() {
    let switch = json!({"type": "switch_session", "sessionId": SessionId::new()});
    assert!(matches!(
        serde_json::from_value::<ClientMessage>(switch).unwrap(),
        ClientMessage::SwitchSession { .. }
    ));

    let rename = json!({"type": "rename_session", "sessionId": SessionId::new(), "name": "scratch"});
    assert!(matches!(
        serde_json::from_value::<ClientMessage>(rename).unwrap(),
        ClientMessage::RenameSession { .. }
    ));

    let list_dir = json!({"type": "list_directory", "path": "/tmp"});
    assert!(matches!(
        serde_json::from_value::<ClientMessage>(list_dir).unwrap(),
        ClientMessage::ListDirectory { .. }
    ));
}

#[test]
fn server_message_error_serializes_with_tag() {
    let msg = ServerMessage::Error { error: ErrorBody { code: "not_found".into(), message: "x".into() } };
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["error"]["code"], "not_found");
}

#[test]
fn server_message_fields_serialize_as_camel_case() {
    let msg = ServerMessage::PermissionResolved {
        session_id: SessionId::new(),
        request_id: PermissionRequestId::new(),
        decision: PermissionDecision::Allow,
        decided_by: ClientId::new(),
    };
    let value = serde_json::to_value(&msg).unwrap();
    assert!(value.get("sessionId").is_some());
    assert!(value.get("requestId").is_some());
    assert!(value.get("decidedBy").is_some());
}
