//! Handshake, gating, and error-code behaviour of the front-end.

use serde_json::json;

use super::test_helpers::{prompt_params, ScriptedBackend, TestClient};

#[tokio::test]
async fn initialize_reports_capabilities() {
    let mut client = TestClient::start(ScriptedBackend::new(Vec::new()), Some("token"));

    let (notifications, response) = client.call(1, "initialize", json!({})).await;

    assert!(notifications.is_empty());
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    let result = &response["result"];
    assert_eq!(result["protocolVersion"], 1);
    assert_eq!(result["agentInfo"]["name"], "gemini-acp-bridge");
    assert_eq!(result["agentCapabilities"]["streaming"], true);
    assert_eq!(result["agentCapabilities"]["cancellation"], true);
    assert_eq!(result["authenticated"], true);
}

#[tokio::test]
async fn methods_before_initialize_are_rejected() {
    let mut client = TestClient::start(ScriptedBackend::new(Vec::new()), Some("token"));

    for (id, method) in [(1, "newSession"), (2, "prompt"), (3, "toolResult"), (4, "cancel"), (5, "shutdown")] {
        let (_, response) = client.call(id, method, json!({})).await;
        assert_eq!(response["error"]["code"], -32002, "{method}: {response}");
        assert_eq!(response["error"]["message"], "not initialized");
    }

    let (_, response) = client.call(6, "initialize", json!({})).await;
    assert!(response.get("result").is_some());
    let (_, response) = client.call(7, "newSession", json!({})).await;
    assert!(response["result"]["sessionId"].is_string());
}

#[tokio::test]
async fn missing_credentials_block_session_methods() {
    let mut client = TestClient::start(ScriptedBackend::new(Vec::new()), None);

    let (_, response) = client.call(1, "initialize", json!({})).await;
    assert_eq!(response["result"]["authenticated"], false);

    let (_, response) = client.call(2, "newSession", json!({})).await;
    assert_eq!(response["error"]["code"], -32001);
    assert_eq!(response["error"]["message"], "authentication required");

    let (_, response) = client.call(3, "prompt", prompt_params("any", "hi")).await;
    assert_eq!(response["error"]["code"], -32001);

    let (_, response) = client.call(4, "cancel", json!({"sessionId": "any"})).await;
    assert_eq!(response["result"], json!({"cancelled": false}));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    let (_, response) = client.call(1, "frobnicate", json!({})).await;

    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["error"]["message"], "method not found: frobnicate");
}

#[tokio::test]
async fn malformed_line_gets_parse_error_and_stream_continues() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    client.send_line("{this is not json").await;
    let response = client.next_message().await.expect("parse error response");
    assert_eq!(response["id"], serde_json::Value::Null);
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["error"]["message"], "parse error");
    assert!(response["error"]["data"].as_str().unwrap().contains("malformed json"));

    client.send_line("").await;
    let (_, response) = client.call(2, "newSession", json!({})).await;
    assert!(response["result"]["sessionId"].is_string());
}

#[tokio::test]
async fn request_without_method_is_a_parse_error() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    client.send_line(r#"{"jsonrpc":"2.0","id":9}"#).await;
    let response = client.next_message().await.expect("response");

    assert_eq!(response["error"]["code"], -32700);
}

#[tokio::test]
async fn invalid_params_are_rejected() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    let (_, response) = client.call(1, "prompt", json!({"messages": []})).await;
    assert_eq!(response["error"]["code"], -32602);

    let (_, response) = client
        .call(2, "toolResult", json!({"sessionId": "s", "callId": "c1"}))
        .await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn notifications_get_no_response() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    client
        .send_line(r#"{"jsonrpc":"2.0","method":"cancel","params":{"sessionId":"x"}}"#)
        .await;
    let (notifications, response) = client.call(5, "newSession", json!({})).await;

    assert!(notifications.is_empty(), "got: {notifications:?}");
    assert_eq!(response["id"], 5);
}

#[tokio::test]
async fn string_ids_are_echoed() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    client
        .send_line(r#"{"jsonrpc":"2.0","id":"abc","method":"newSession"}"#)
        .await;
    let response = client.next_message().await.expect("response");

    assert_eq!(response["id"], "abc");
    assert!(response["result"]["sessionId"].is_string());
}

#[tokio::test]
async fn repeated_initialize_is_allowed() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    let (_, response) = client.call(1, "initialize", json!({})).await;

    assert_eq!(response["result"]["authenticated"], true);
}

#[tokio::test]
async fn oversized_line_is_rejected_and_stream_continues() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;

    let huge = "x".repeat(gemini_acp_bridge::acp::codec::MAX_LINE_BYTES + 16);
    client.send_line(&huge).await;
    let response = client.next_message().await.expect("parse error response");
    assert_eq!(response["id"], serde_json::Value::Null);
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["error"]["message"], "parse error");
    assert!(
        response["error"]["data"]
            .as_str()
            .unwrap()
            .contains("line too long"),
        "got: {response}"
    );

    let (_, response) = client.call(2, "newSession", json!({})).await;
    assert!(response["result"]["sessionId"].is_string());
}
