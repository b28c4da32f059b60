//! One prompt-or-tool-result turn, end to end.
//!
//! 1. Claim the session's cancellation slot (rejects unknown or busy sessions
//!    before anything is recorded).
//! 2. Record the triggering input into history.
//! 3. Build the backend request from the session and start the stream.
//! 4. Translate every event, pushing each update to the client as soon as it
//!    is produced, and mirror tool calls and assistant text into history.
//! 5. Release the slot, whatever the outcome.
//!
//! Once cancelled, a turn sends nothing further and writes nothing further
//! to history: sends race the cancellation token, and history writes are
//! refused by the store once the turn's generation no longer owns the slot.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session_store::SessionStore;
use super::translator::StreamTranslator;
use crate::acp::message::session_update_notification;
use crate::backend::{GenerateRequest, ModelBackend};
use crate::models::content::FunctionCall;
use crate::models::tool::ToolDefinition;
use crate::models::update::{PendingToolCall, SessionUpdate, TurnResult};
use crate::{AppError, Result};

/// What triggered a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    /// User-authored message fragments, joined by newlines.
    Prompt(Vec<String>),
    /// The client's result for an earlier tool call.
    ToolResult {
        /// Identifier of the originating call.
        call_id: String,
        /// Name of the tool that ran.
        tool_name: String,
        /// Tool output; a plain string is normalised to `{"output": …}`.
        result: Value,
    },
}

/// Releases the session's cancellation slot when the turn ends, however it
/// ends.
struct TurnGuard<'a> {
    store: &'a SessionStore,
    session_id: &'a str,
    generation: u64,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.store
            .clear_cancellation_handle(self.session_id, self.generation);
    }
}

/// Drives turns against the model backend.
#[derive(Clone)]
pub struct TurnOrchestrator {
    store: Arc<SessionStore>,
    backend: Arc<dyn ModelBackend>,
    default_tools: Arc<[ToolDefinition]>,
    outbound: mpsc::Sender<Value>,
}

impl TurnOrchestrator {
    /// Create an orchestrator that writes notifications to `outbound`.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn ModelBackend>,
        default_tools: Arc<[ToolDefinition]>,
        outbound: mpsc::Sender<Value>,
    ) -> Self {
        Self {
            store,
            backend,
            default_tools,
            outbound,
        }
    }

    /// Execute one turn on `session_id`.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the session does not exist.
    /// - `AppError::SessionBusy` if the session already has a turn in flight.
    /// - `AppError::Cancelled` if the turn was cancelled.
    /// - `AppError::Backend` if the backend call or its stream fails.
    /// - `AppError::Acp` if the outbound channel is closed.
    pub async fn run_turn(&self, session_id: &str, input: TurnInput) -> Result<TurnResult> {
        let handle = self.store.begin_turn(session_id)?;
        let generation = handle.generation();
        let _guard = TurnGuard {
            store: &self.store,
            session_id,
            generation,
        };
        let cancel = handle.token().clone();

        self.record_input(session_id, input);

        let session = self
            .store
            .get_session(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session '{session_id}'")))?;
        let tools = session.effective_tools(&self.default_tools).to_vec();
        let request = GenerateRequest {
            model: session.model,
            contents: session.history,
            system_instruction: session.system_instruction,
            tools: tools.clone(),
        };

        info!(
            session_id,
            generation,
            history = request.contents.len(),
            "turn: calling backend"
        );

        let mut stream = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(AppError::Cancelled),

            result = self.backend.stream_generate(request, cancel.clone()) => result?,
        };

        let mut translator = StreamTranslator::new(tools);
        let mut pending = Vec::new();
        let mut committed = 0usize;

        loop {
            let event = tokio::select! {
                biased;

                () = cancel.cancelled() => return Err(AppError::Cancelled),

                event = stream.next() => event,
            };
            let Some(event) = event else {
                break;
            };

            for update in translator.translate(event?) {
                self.emit(session_id, &update, &cancel).await?;

                match update {
                    SessionUpdate::ToolCall {
                        call_id,
                        tool,
                        input,
                    } => {
                        // Text generated before the call precedes it in history.
                        committed = self.commit_text(session_id, generation, &translator, committed)?;
                        pending.push(PendingToolCall {
                            call_id: call_id.clone(),
                            tool_name: tool.name.clone(),
                        });
                        self.store.append_tool_call_for_turn(
                            session_id,
                            generation,
                            FunctionCall {
                                id: Some(call_id),
                                name: tool.name,
                                args: input,
                            },
                        )?;
                    }
                    SessionUpdate::SessionComplete { reason } => {
                        debug!(session_id, ?reason, "turn: completion received");
                        committed = self.commit_text(session_id, generation, &translator, committed)?;
                    }
                    _ => {}
                }
            }
        }

        // Streams that end without a finish marker still keep their text.
        self.commit_text(session_id, generation, &translator, committed)?;

        info!(
            session_id,
            pending = pending.len(),
            last_call_id = translator.last_call_id(),
            "turn: finished"
        );
        Ok(TurnResult { pending })
    }

    fn record_input(&self, session_id: &str, input: TurnInput) {
        match input {
            TurnInput::Prompt(fragments) => {
                let text = fragments.join("\n");
                if !text.is_empty() {
                    self.store.append_user_text(session_id, &text);
                }
            }
            TurnInput::ToolResult {
                call_id,
                tool_name,
                result,
            } => {
                self.store
                    .append_tool_result(session_id, &call_id, &tool_name, result);
            }
        }
    }

    /// Append text accumulated since `committed` and return the new mark.
    fn commit_text(
        &self,
        session_id: &str,
        generation: u64,
        translator: &StreamTranslator,
        committed: usize,
    ) -> Result<usize> {
        let text = translator.accumulated_text();
        if text.len() > committed {
            self.store
                .append_assistant_text_for_turn(session_id, generation, &text[committed..])?;
        }
        Ok(text.len())
    }

    async fn emit(&self, session_id: &str, update: &SessionUpdate, cancel: &CancellationToken) -> Result<()> {
        let notification = session_update_notification(session_id, update)?;
        tokio::select! {
            biased;

            () = cancel.cancelled() => Err(AppError::Cancelled),

            sent = self.outbound.send(notification) => sent.map_err(|_| {
                warn!(session_id, "turn: outbound channel closed");
                AppError::Acp("write failed: outbound channel closed".into())
            }),
        }
    }
}
