//! In-memory session state.
//!
//! [`SessionStore`] owns every live [`Session`] and its cancellation slot.
//! All operations are synchronous and never hold the lock across an await
//! point. Mutations on an unknown session id are silently ignored; lookups
//! report absence to the caller.
//!
//! # Cancellation slot
//!
//! Each session holds at most one [`CancelHandle`]. Handles carry a
//! generation number so that a turn that finishes after being cancelled and
//! superseded cannot clear the slot of the newer turn:
//! [`SessionStore::clear_cancellation_handle`] only clears a slot whose
//! generation matches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::models::content::{Content, FunctionCall, FunctionResponse, Part, Role};
use crate::models::session::{Session, SessionConfig};
use crate::{AppError, Result};

/// Abortable token for one in-flight backend call.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    generation: u64,
    token: CancellationToken,
}

impl CancelHandle {
    /// Monotonic number identifying the turn that owns this handle.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token that fires when the turn is cancelled.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    handle: Option<CancelHandle>,
}

/// Thread-safe map of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    next_generation: AtomicU64,
    default_model: String,
    default_system_instruction: Option<String>,
}

impl SessionStore {
    /// Create an empty store with the given process defaults.
    #[must_use]
    pub fn new(default_model: impl Into<String>, default_system_instruction: Option<String>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            default_model: default_model.into(),
            default_system_instruction,
        }
    }

    /// Create an empty store using the defaults from `config`.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.default_model.clone(),
            config.system_instruction.clone(),
        )
    }

    /// Create a session, applying `config` overrides over the process defaults.
    pub fn create_session(&self, config: SessionConfig) -> Session {
        let model = config
            .model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone());
        let system_instruction = config
            .system_instruction
            .or_else(|| self.default_system_instruction.clone());

        let session = Session::new(model, system_instruction, config.tools);
        info!(
            session_id = session.id.as_str(),
            model = session.model.as_str(),
            tools = session.tools.len(),
            "session created"
        );

        self.lock().insert(
            session.id.clone(),
            SessionEntry {
                session: session.clone(),
                handle: None,
            },
        );
        session
    }

    /// Snapshot of a session, or `None` if it does not exist.
    #[must_use]
    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.lock().get(id).map(|entry| entry.session.clone())
    }

    /// Whether a session with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append a user text element.
    pub fn append_user_text(&self, id: &str, text: &str) {
        self.with_history(id, |history| history.push(Content::user_text(text)));
    }

    /// Append assistant text, merging into the trailing model element while
    /// that element holds only text.
    pub fn append_assistant_text(&self, id: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        self.with_history(id, |history| merge_assistant_text(history, text));
    }

    /// Append a tool-call part to the trailing model element, opening one if
    /// the history does not end with a model element.
    pub fn append_tool_call(&self, id: &str, call: FunctionCall) {
        self.with_history(id, |history| push_tool_call(history, call));
    }

    /// [`append_assistant_text`](Self::append_assistant_text) on behalf of
    /// the turn holding `generation`.
    ///
    /// # Errors
    ///
    /// `AppError::Cancelled` if that turn no longer owns the session's slot.
    pub fn append_assistant_text_for_turn(&self, id: &str, generation: u64, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.with_turn_history(id, generation, |history| merge_assistant_text(history, text))
    }

    /// [`append_tool_call`](Self::append_tool_call) on behalf of the turn
    /// holding `generation`.
    ///
    /// # Errors
    ///
    /// `AppError::Cancelled` if that turn no longer owns the session's slot.
    pub fn append_tool_call_for_turn(&self, id: &str, generation: u64, call: FunctionCall) -> Result<()> {
        self.with_turn_history(id, generation, |history| push_tool_call(history, call))
    }

    /// Append a tool result as a new user element.
    ///
    /// A plain string `result` is stored as `{"output": result}`; any other
    /// value is stored unchanged.
    pub fn append_tool_result(&self, id: &str, call_id: &str, tool_name: &str, result: Value) {
        let response = match result {
            Value::String(output) => json!({ "output": output }),
            other => other,
        };
        self.with_history(id, |history| {
            history.push(Content {
                role: Role::User,
                parts: vec![Part::FunctionResponse(FunctionResponse {
                    id: Some(call_id.to_owned()),
                    name: tool_name.to_owned(),
                    response,
                })],
            });
        });
    }

    /// Claim the session's cancellation slot for a new turn.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the session does not exist.
    /// - `AppError::SessionBusy` if another turn still owns the slot.
    pub fn begin_turn(&self, id: &str) -> Result<CancelHandle> {
        let mut sessions = self.lock();
        let Some(entry) = sessions.get_mut(id) else {
            return Err(AppError::NotFound(format!("session '{id}'")));
        };
        if let Some(live) = &entry.handle {
            return Err(AppError::SessionBusy(format!(
                "session '{id}' already has turn {} in flight",
                live.generation
            )));
        }

        let handle = CancelHandle {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        entry.handle = Some(handle.clone());
        debug!(session_id = id, generation = handle.generation, "turn started");
        Ok(handle)
    }

    /// Replace the session's cancellation slot unconditionally.
    pub fn set_cancellation_handle(&self, id: &str, handle: Option<CancelHandle>) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.handle = handle;
        }
    }

    /// Clear the slot if it still holds the handle of `generation`.
    ///
    /// Returns `false` when the slot is empty or owned by another turn.
    pub fn clear_cancellation_handle(&self, id: &str, generation: u64) -> bool {
        let mut sessions = self.lock();
        let Some(entry) = sessions.get_mut(id) else {
            return false;
        };
        match &entry.handle {
            Some(live) if live.generation == generation => {
                entry.handle = None;
                debug!(session_id = id, generation, "turn handle released");
                true
            }
            _ => false,
        }
    }

    /// Whether the session currently has a live handle.
    #[must_use]
    pub fn has_live_handle(&self, id: &str) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|entry| entry.handle.is_some())
    }

    /// Abort the session's live handle, if any.
    ///
    /// Returns whether anything was cancelled.
    pub fn cancel(&self, id: &str) -> bool {
        let handle = {
            let mut sessions = self.lock();
            let handle = sessions.get_mut(id).and_then(|entry| entry.handle.take());
            if let Some(handle) = &handle {
                handle.token.cancel();
            }
            handle
        };
        match handle {
            Some(handle) => {
                info!(session_id = id, generation = handle.generation, "turn cancelled");
                true
            }
            None => false,
        }
    }

    /// Abort every live handle and discard all sessions.
    pub fn clear(&self) {
        let mut sessions = self.lock();
        let mut aborted = 0usize;
        for entry in sessions.values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.token.cancel();
                aborted += 1;
            }
        }
        let discarded = sessions.len();
        sessions.clear();
        info!(discarded, aborted, "session store cleared");
    }

    fn with_history(&self, id: &str, mutate: impl FnOnce(&mut Vec<Content>)) {
        if let Some(entry) = self.lock().get_mut(id) {
            mutate(&mut entry.session.history);
        }
    }

    fn with_turn_history(
        &self,
        id: &str,
        generation: u64,
        mutate: impl FnOnce(&mut Vec<Content>),
    ) -> Result<()> {
        let mut sessions = self.lock();
        match sessions.get_mut(id) {
            Some(entry)
                if entry
                    .handle
                    .as_ref()
                    .is_some_and(|live| live.generation == generation) =>
            {
                mutate(&mut entry.session.history);
                Ok(())
            }
            _ => {
                debug!(session_id = id, generation, "stale turn output dropped");
                Err(AppError::Cancelled)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn merge_assistant_text(history: &mut Vec<Content>, text: &str) {
    match history.last_mut() {
        Some(last) if last.role == Role::Model && last.is_text_only() => {
            if let Some(Part::Text(existing)) = last.parts.last_mut() {
                existing.push_str(text);
            } else {
                last.parts.push(Part::Text(text.to_owned()));
            }
        }
        _ => history.push(Content::model_text(text)),
    }
}

fn push_tool_call(history: &mut Vec<Content>, call: FunctionCall) {
    match history.last_mut() {
        Some(last) if last.role == Role::Model => last.parts.push(Part::FunctionCall(call)),
        _ => history.push(Content {
            role: Role::Model,
            parts: vec![Part::FunctionCall(call)],
        }),
    }
}
