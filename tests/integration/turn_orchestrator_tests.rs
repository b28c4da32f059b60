//! Turn orchestration driven directly, without the transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use gemini_acp_bridge::backend::FinishReason;
use gemini_acp_bridge::models::content::{Content, FunctionCall, Part, Role};
use gemini_acp_bridge::models::session::SessionConfig;
use gemini_acp_bridge::models::tool::{default_catalogue, ToolDefinition};
use gemini_acp_bridge::models::update::PendingToolCall;
use gemini_acp_bridge::orchestrator::session_store::SessionStore;
use gemini_acp_bridge::orchestrator::turn::{TurnInput, TurnOrchestrator};
use gemini_acp_bridge::AppError;

use super::test_helpers::{call_part, chunk, finish_chunk, text_chunk, Script, ScriptedBackend};

struct Harness {
    store: Arc<SessionStore>,
    backend: Arc<ScriptedBackend>,
    orchestrator: TurnOrchestrator,
    updates: mpsc::Receiver<Value>,
    session_id: String,
}

fn harness(scripts: Vec<Script>) -> Harness {
    harness_with_capacity(scripts, 64)
}

fn harness_with_capacity(scripts: Vec<Script>, capacity: usize) -> Harness {
    let store = Arc::new(SessionStore::new("gemini-test", None));
    let backend = ScriptedBackend::new(scripts);
    let (tx, updates) = mpsc::channel(capacity);
    let tools: Arc<[ToolDefinition]> = default_catalogue().into();
    let orchestrator = TurnOrchestrator::new(Arc::clone(&store), backend.clone(), tools, tx);
    let session_id = store.create_session(SessionConfig::default()).id;
    Harness {
        store,
        backend,
        orchestrator,
        updates,
        session_id,
    }
}

fn drain(updates: &mut mpsc::Receiver<Value>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(message) = updates.try_recv() {
        out.push(message["params"]["update"].clone());
    }
    out
}

fn prompt(text: &str) -> TurnInput {
    TurnInput::Prompt(vec![text.to_owned()])
}

#[tokio::test]
async fn chunks_across_events_merge_into_one_history_element() {
    let mut h = harness(vec![Script::Events(vec![
        text_chunk("Hel"),
        text_chunk("lo, "),
        text_chunk("world"),
        finish_chunk(FinishReason::Stop),
    ])]);

    let result = h.orchestrator.run_turn(&h.session_id, prompt("hi")).await.unwrap();

    assert!(result.pending.is_empty());
    let updates = drain(&mut h.updates);
    assert_eq!(updates.len(), 4);
    let indices: Vec<&Value> = updates[..3].iter().map(|u| &u["index"]).collect();
    assert_eq!(indices, vec![&json!(0), &json!(1), &json!(2)]);
    assert_eq!(updates[0]["messageId"], updates[2]["messageId"]);

    let history = h.store.get_session(&h.session_id).unwrap().history;
    assert_eq!(history, vec![Content::user_text("hi"), Content::model_text("Hello, world")]);
}

#[tokio::test]
async fn text_before_tool_call_precedes_it_in_history() {
    let mut h = harness(vec![Script::Events(vec![
        text_chunk("Checking the file."),
        chunk(
            vec![call_part(Some("c1"), "read_file", json!({"path": "a.txt"}))],
            Some(FinishReason::ToolUse),
        ),
    ])]);

    let result = h.orchestrator.run_turn(&h.session_id, prompt("read a.txt")).await.unwrap();

    assert_eq!(
        result.pending,
        vec![PendingToolCall {
            call_id: "c1".into(),
            tool_name: "read_file".into()
        }]
    );
    let types: Vec<Value> = drain(&mut h.updates).into_iter().map(|u| u["type"].clone()).collect();
    assert_eq!(
        types,
        vec![json!("agent_message_chunk"), json!("tool_call"), json!("session_complete")]
    );

    let history = h.store.get_session(&h.session_id).unwrap().history;
    assert_eq!(
        history[1],
        Content {
            role: Role::Model,
            parts: vec![
                Part::Text("Checking the file.".into()),
                Part::FunctionCall(FunctionCall {
                    id: Some("c1".into()),
                    name: "read_file".into(),
                    args: json!({"path": "a.txt"}),
                }),
            ],
        }
    );
}

#[tokio::test]
async fn parallel_tool_calls_are_all_pending() {
    let h = harness(vec![Script::Events(vec![chunk(
        vec![
            call_part(Some("c1"), "read_file", json!({"path": "a"})),
            call_part(Some("c2"), "read_file", json!({"path": "b"})),
        ],
        Some(FinishReason::ToolUse),
    )])]);

    let result = h.orchestrator.run_turn(&h.session_id, prompt("both")).await.unwrap();

    let ids: Vec<&str> = result.pending.iter().map(|p| p.call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    let history = h.store.get_session(&h.session_id).unwrap().history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].parts.len(), 2);
}

#[tokio::test]
async fn structured_tool_result_is_sent_unchanged() {
    let h = harness(vec![Script::Events(vec![finish_chunk(FinishReason::Stop)])]);

    h.orchestrator
        .run_turn(
            &h.session_id,
            TurnInput::ToolResult {
                call_id: "c9".into(),
                tool_name: "list_directory".into(),
                result: json!({"entries": ["a", "b"]}),
            },
        )
        .await
        .unwrap();

    let contents = &h.backend.requests()[0].contents;
    let Part::FunctionResponse(response) = &contents[0].parts[0] else {
        panic!("expected function response, got {:?}", contents[0]);
    };
    assert_eq!(response.id.as_deref(), Some("c9"));
    assert_eq!(response.response, json!({"entries": ["a", "b"]}));
}

#[tokio::test]
async fn empty_prompt_records_nothing() {
    let h = harness(vec![Script::Events(vec![finish_chunk(FinishReason::Stop)])]);

    h.orchestrator
        .run_turn(&h.session_id, TurnInput::Prompt(Vec::new()))
        .await
        .unwrap();

    assert!(h.backend.requests()[0].contents.is_empty());
}

#[tokio::test]
async fn max_tokens_completes_with_max_tokens() {
    let mut h = harness(vec![Script::Events(vec![chunk(
        vec![Part::Text("truncat".into())],
        Some(FinishReason::MaxTokens),
    )])]);

    h.orchestrator.run_turn(&h.session_id, prompt("long")).await.unwrap();

    let updates = drain(&mut h.updates);
    assert_eq!(updates[1], json!({"type": "session_complete", "reason": "max_tokens"}));
}

#[tokio::test]
async fn unknown_session_touches_nothing() {
    let mut h = harness(Vec::new());

    let err = h
        .orchestrator
        .run_turn("missing", prompt("hi"))
        .await
        .expect_err("unknown session");

    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
    assert!(drain(&mut h.updates).is_empty());
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn slot_is_released_after_failure() {
    let h = harness(vec![
        Script::Fail("connection refused".into()),
        Script::Events(vec![finish_chunk(FinishReason::Stop)]),
    ]);

    let err = h
        .orchestrator
        .run_turn(&h.session_id, prompt("one"))
        .await
        .expect_err("backend fails");
    assert!(matches!(err, AppError::Backend(_)));
    assert!(!h.store.has_live_handle(&h.session_id));

    h.orchestrator
        .run_turn(&h.session_id, prompt("two"))
        .await
        .expect("second turn runs");
}

#[tokio::test]
async fn closed_outbound_channel_fails_the_turn() {
    let Harness {
        store,
        orchestrator,
        updates,
        session_id,
        ..
    } = harness(vec![Script::Events(vec![text_chunk("lost")])]);
    drop(updates);

    let err = orchestrator
        .run_turn(&session_id, prompt("hi"))
        .await
        .expect_err("nowhere to write");

    assert!(err.to_string().contains("outbound channel closed"), "got: {err}");
    assert!(!store.has_live_handle(&session_id));
}

#[tokio::test]
async fn cancelled_turn_blocked_on_send_stays_out_of_next_turn() {
    let mut h = harness_with_capacity(
        vec![
            Script::EventsThenHang(vec![chunk(
                vec![
                    Part::Text("a".into()),
                    call_part(Some("c1"), "read_file", json!({"path": "a"})),
                ],
                None,
            )]),
            Script::Events(Vec::new()),
        ],
        1,
    );

    // The text chunk fills the channel; the tool_call send then waits.
    let first = {
        let orchestrator = h.orchestrator.clone();
        let session_id = h.session_id.clone();
        tokio::spawn(async move { orchestrator.run_turn(&session_id, prompt("first")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.store.cancel(&h.session_id));
    h.orchestrator
        .run_turn(&h.session_id, prompt("second"))
        .await
        .expect("second turn runs");

    let err = first.await.unwrap().expect_err("first turn was cancelled");
    assert!(matches!(err, AppError::Cancelled), "got: {err}");

    let types: Vec<Value> = drain(&mut h.updates).into_iter().map(|u| u["type"].clone()).collect();
    assert_eq!(types, vec![json!("agent_message_chunk")]);
    let history = h.store.get_session(&h.session_id).unwrap().history;
    assert_eq!(history, vec![Content::user_text("first"), Content::user_text("second")]);
}
