//! Shutdown, end of input, and external cancellation of the server loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gemini_acp_bridge::acp::server::{AcpServer, ServerState};
use gemini_acp_bridge::backend::FinishReason;
use gemini_acp_bridge::GlobalConfig;

use super::test_helpers::{
    finish_chunk, prompt_params, text_chunk, FixedCredentials, Script, ScriptedBackend, TestClient,
};

#[tokio::test]
async fn shutdown_acknowledges_then_stops_server() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;
    client.new_session(1).await;
    client.new_session(2).await;
    assert_eq!(client.store.len(), 2);

    let (_, response) = client.call(3, "shutdown", json!({})).await;

    assert_eq!(response["result"], Value::Null);
    assert!(response.get("error").is_none());
    assert!(client.next_message().await.is_none(), "output closes after shutdown");
    assert!(client.store.is_empty());
    client.join().await;
}

#[tokio::test]
async fn shutdown_aborts_live_turns() {
    let backend = ScriptedBackend::new(vec![Script::EventsThenHang(vec![text_chunk("working")])]);
    let mut client = TestClient::initialized(backend).await;
    let session_id = client.new_session(1).await;

    client.send(2, "prompt", prompt_params(&session_id, "long")).await;
    client.next_message().await.expect("first chunk");
    client.send(3, "shutdown", json!({})).await;

    let mut remaining = Vec::new();
    while let Some(message) = client.next_message().await {
        remaining.push(message);
    }

    let prompt = remaining.iter().find(|m| m["id"] == 2).expect("prompt answered");
    assert_eq!(prompt["error"]["message"], "request cancelled");
    let shutdown = remaining.iter().find(|m| m["id"] == 3).expect("shutdown answered");
    assert_eq!(shutdown["result"], Value::Null);
    client.join().await;
}

#[tokio::test]
async fn repeated_shutdown_is_idempotent() {
    let state = ServerState::new(
        Arc::new(GlobalConfig::default()),
        Arc::new(FixedCredentials(Some("token".into()))),
        ScriptedBackend::new(Vec::new()),
    );
    let store = Arc::clone(&state.store);
    let (tx, _rx) = mpsc::channel(16);
    let server = AcpServer::new(state, tx, CancellationToken::new());

    server.dispatch("initialize", Value::Null).await.unwrap();
    server.dispatch("newSession", Value::Null).await.unwrap();
    assert_eq!(store.len(), 1);

    assert_eq!(server.dispatch("shutdown", Value::Null).await.unwrap(), Value::Null);
    assert_eq!(server.dispatch("shutdown", Value::Null).await.unwrap(), Value::Null);
    assert!(store.is_empty());
}

#[tokio::test]
async fn end_of_input_waits_for_in_flight_turns() {
    let backend = ScriptedBackend::new(vec![Script::Delayed(
        Duration::from_millis(100),
        vec![text_chunk("late answer"), finish_chunk(FinishReason::Stop)],
    )]);
    let mut client = TestClient::initialized(backend).await;
    let session_id = client.new_session(1).await;

    client.send(2, "prompt", prompt_params(&session_id, "q")).await;
    let remaining = client.finish().await;

    assert_eq!(remaining.len(), 3, "got: {remaining:?}");
    assert_eq!(remaining[0]["params"]["update"]["chunk"], "late answer");
    assert_eq!(remaining[2]["id"], 2);
    assert_eq!(remaining[2]["result"], json!({}));
}

#[tokio::test]
async fn external_cancellation_stops_the_server() {
    let mut client = TestClient::initialized(ScriptedBackend::new(Vec::new())).await;
    let session_id = client.new_session(1).await;

    client.shutdown.cancel();

    assert!(client.next_message().await.is_none());
    assert!(!client.store.contains(&session_id));
    client.join().await;
}
