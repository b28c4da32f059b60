//! ACP request loop and method dispatch.
//!
//! # Methods
//!
//! | Method        | Gated on `initialize` | Needs credentials | Result                   |
//! |---------------|-----------------------|-------------------|--------------------------|
//! | `initialize`  | no                    | no                | capabilities and version |
//! | `newSession`  | yes                   | yes               | `{sessionId}`            |
//! | `prompt`      | yes                   | yes               | `{pending?}`             |
//! | `toolResult`  | yes                   | yes               | `{pending?}`             |
//! | `cancel`      | yes                   | no                | `{cancelled}`            |
//! | `shutdown`    | yes                   | no                | `null`, then exit        |
//!
//! Requests are read serially but each one runs on its own task, so a long
//! turn never blocks `cancel` or turns on other sessions. Responses and
//! notifications share one outbound channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::acp::codec::{AcpCodec, Frame, MAX_LINE_BYTES};
use crate::acp::message::{RpcError, RpcRequest, RpcResponse};
use crate::acp::reader::parse_request_line;
use crate::acp::writer::run_writer;
use crate::backend::{CredentialProvider, ModelBackend};
use crate::config::GlobalConfig;
use crate::models::session::SessionConfig;
use crate::models::tool::ToolDefinition;
use crate::orchestrator::session_store::SessionStore;
use crate::orchestrator::turn::{TurnInput, TurnOrchestrator};
use crate::{AppError, Result};

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Capacity of the outbound message channel.
const OUTBOUND_CAPACITY: usize = 256;

/// Dependencies shared by every request handler.
#[derive(Clone)]
pub struct ServerState {
    /// Immutable process configuration.
    pub config: Arc<GlobalConfig>,
    /// Live sessions.
    pub store: Arc<SessionStore>,
    /// Token source consulted by `initialize`.
    pub credentials: Arc<dyn CredentialProvider>,
    /// Model backend; only used once authentication succeeded.
    pub backend: Arc<dyn ModelBackend>,
}

impl ServerState {
    /// Bundle the handler dependencies, creating an empty session store.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        credentials: Arc<dyn CredentialProvider>,
        backend: Arc<dyn ModelBackend>,
    ) -> Self {
        let store = Arc::new(SessionStore::from_config(&config));
        Self {
            config,
            store,
            credentials,
            backend,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptParams {
    session_id: String,
    #[serde(default)]
    messages: Vec<PromptMessage>,
}

#[derive(Debug, Deserialize)]
struct PromptMessage {
    #[serde(default = "default_role")]
    role: String,
    content: MessageContent,
}

fn default_role() -> String {
    "user".into()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultParams {
    session_id: String,
    call_id: String,
    tool_name: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelParams {
    session_id: String,
}

/// User-authored text fragments of a `prompt` request, in order.
fn user_fragments(messages: Vec<PromptMessage>) -> Vec<String> {
    let mut fragments = Vec::new();
    for message in messages.into_iter().filter(|m| m.role == "user") {
        match message.content {
            MessageContent::Text(text) => fragments.push(text),
            MessageContent::Blocks(blocks) => fragments.extend(
                blocks
                    .into_iter()
                    .filter(|block| block.kind == "text")
                    .filter_map(|block| block.text),
            ),
        }
    }
    fragments
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| AppError::InvalidParams(format!("{method}: {e}")))
}

/// Request dispatcher shared by all handler tasks.
pub struct AcpServer {
    state: ServerState,
    default_tools: Arc<[ToolDefinition]>,
    initialized: AtomicBool,
    authenticated: AtomicBool,
    outbound: mpsc::Sender<Value>,
    shutdown: CancellationToken,
}

impl AcpServer {
    /// Create a dispatcher writing to `outbound`. Cancelling `shutdown` stops
    /// the request loop.
    #[must_use]
    pub fn new(state: ServerState, outbound: mpsc::Sender<Value>, shutdown: CancellationToken) -> Self {
        let default_tools: Arc<[ToolDefinition]> = state.config.tools.clone().into();
        Self {
            state,
            default_tools,
            initialized: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            outbound,
            shutdown,
        }
    }

    /// Read requests from `input` until end of input or shutdown.
    ///
    /// Each request runs on its own task. Before returning, waits for every
    /// in-flight handler and clears the session store.
    pub async fn run<R>(self: Arc<Self>, input: R)
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut framed = FramedRead::new(input, AcpCodec::new());
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("acp: shutdown requested, aborting live turns");
                    self.state.store.clear();
                    break;
                }

                item = framed.next() => match item {
                    None => {
                        info!("acp: end of input");
                        break;
                    }
                    Some(Err(err)) => {
                        warn!(%err, "acp: transport read failed, stopping");
                        break;
                    }
                    Some(Ok(Frame::Oversized)) => {
                        warn!(limit = MAX_LINE_BYTES, "acp: oversized line discarded");
                        self.respond(RpcResponse::failure(
                            Value::Null,
                            RpcError::parse_error(Frame::oversized_detail()),
                        ))
                        .await;
                    }
                    Some(Ok(Frame::Line(line))) => match parse_request_line(&line) {
                        Ok(None) => {}
                        Ok(Some(request)) => {
                            let server = Arc::clone(&self);
                            tracker.spawn(async move { server.handle_request(request).await });
                            debug!(in_flight = tracker.len(), "acp: request dispatched");
                        }
                        Err(err) => {
                            warn!(%err, raw_line = %line, "acp: parse error");
                            self.respond(RpcResponse::failure(
                                Value::Null,
                                RpcError::parse_error(err.to_string()),
                            ))
                            .await;
                        }
                    },
                },
            }
        }

        tracker.close();
        info!(in_flight = tracker.len(), "acp: waiting for in-flight requests");
        tracker.wait().await;
        self.state.store.clear();
    }

    /// Run one request and write its response, if it has an id.
    pub async fn handle_request(&self, request: RpcRequest) {
        let RpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = method.as_str(), "acp: handling request");

        let outcome = self.dispatch(&method, params).await;
        let shutting_down = method == "shutdown" && outcome.is_ok();

        match (id, outcome) {
            (Some(id), Ok(result)) => self.respond(RpcResponse::success(id, result)).await,
            (Some(id), Err(err)) => {
                debug!(method = method.as_str(), %err, "acp: request failed");
                self.respond(RpcResponse::failure(id, RpcError::from(&err)))
                    .await;
            }
            (None, Ok(_)) => {}
            (None, Err(err)) => {
                debug!(method = method.as_str(), %err, "acp: notification failed");
            }
        }

        // Only after the acknowledgement is queued.
        if shutting_down {
            self.shutdown.cancel();
        }
    }

    /// Route `method` to its handler.
    ///
    /// # Errors
    ///
    /// Returns the handler's error; see the module table for gating.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "initialize" => self.initialize().await,
            "newSession" | "prompt" | "toolResult" | "cancel" | "shutdown"
                if !self.initialized.load(Ordering::SeqCst) =>
            {
                Err(AppError::NotInitialized)
            }
            "newSession" => self.new_session(params),
            "prompt" => self.prompt(params).await,
            "toolResult" => self.tool_result(params).await,
            "cancel" => self.cancel(params),
            "shutdown" => Ok(self.shutdown_sessions()),
            other => Err(AppError::MethodNotFound(other.to_owned())),
        }
    }

    async fn initialize(&self) -> Result<Value> {
        if !self.authenticated.load(Ordering::SeqCst) {
            match self.state.credentials.valid_token().await {
                Ok(Some(_)) => {
                    self.authenticated.store(true, Ordering::SeqCst);
                    info!("acp: backend credentials available");
                }
                Ok(None) => warn!("acp: no credentials found, sessions unavailable"),
                Err(err) => warn!(%err, "acp: credential lookup failed"),
            }
        }
        self.initialized.store(true, Ordering::SeqCst);

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "agentInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "agentCapabilities": {
                "streaming": true,
                "tools": true,
                "thoughts": true,
                "cancellation": true,
            },
            "authenticated": self.authenticated.load(Ordering::SeqCst),
        }))
    }

    fn authenticated_backend(&self) -> Result<Arc<dyn ModelBackend>> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(Arc::clone(&self.state.backend))
        } else {
            Err(AppError::AuthRequired)
        }
    }

    fn orchestrator(&self) -> Result<TurnOrchestrator> {
        Ok(TurnOrchestrator::new(
            Arc::clone(&self.state.store),
            self.authenticated_backend()?,
            Arc::clone(&self.default_tools),
            self.outbound.clone(),
        ))
    }

    fn new_session(&self, params: Value) -> Result<Value> {
        self.authenticated_backend()?;
        let config: SessionConfig = parse_params("newSession", params)?;
        let session = self.state.store.create_session(config);
        Ok(json!({ "sessionId": session.id }))
    }

    async fn prompt(&self, params: Value) -> Result<Value> {
        let orchestrator = self.orchestrator()?;
        let params: PromptParams = parse_params("prompt", params)?;
        let input = TurnInput::Prompt(user_fragments(params.messages));
        let result = orchestrator.run_turn(&params.session_id, input).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn tool_result(&self, params: Value) -> Result<Value> {
        let orchestrator = self.orchestrator()?;
        let params: ToolResultParams = parse_params("toolResult", params)?;
        let input = TurnInput::ToolResult {
            call_id: params.call_id,
            tool_name: params.tool_name,
            result: params.result,
        };
        let result = orchestrator.run_turn(&params.session_id, input).await?;
        Ok(serde_json::to_value(result)?)
    }

    fn cancel(&self, params: Value) -> Result<Value> {
        let params: CancelParams = parse_params("cancel", params)?;
        let cancelled = self.state.store.cancel(&params.session_id);
        Ok(json!({ "cancelled": cancelled }))
    }

    fn shutdown_sessions(&self) -> Value {
        info!(sessions = self.state.store.len(), "acp: shutdown");
        self.state.store.clear();
        Value::Null
    }

    async fn respond(&self, response: RpcResponse) {
        let value = match serde_json::to_value(&response) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "acp: failed to serialise response");
                return;
            }
        };
        if self.outbound.send(value).await.is_err() {
            debug!("acp: outbound channel closed, dropping response");
        }
    }
}

/// Serve ACP over `input`/`output` until end of input or shutdown.
///
/// # Errors
///
/// Returns `AppError::Acp` if the writer fails, or `AppError::Io` if the
/// writer task panics.
pub async fn serve<R, W>(input: R, output: W, state: ServerState, shutdown: CancellationToken) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(run_writer(output, rx));

    let server = Arc::new(AcpServer::new(state, tx, shutdown));
    server.run(input).await;

    writer
        .await
        .map_err(|err| AppError::Io(format!("writer task panicked: {err}")))?
}

/// Serve ACP over the process's stdin and stdout.
///
/// # Errors
///
/// See [`serve`].
pub async fn serve_stdio(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    info!("starting stdio ACP transport");
    let result = serve(tokio::io::stdin(), tokio::io::stdout(), state, shutdown).await;
    info!("stdio ACP transport shut down");
    result
}
