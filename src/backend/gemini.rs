//! HTTP implementation of [`ModelBackend`] for the generative language API.
//!
//! Calls `{base_url}/models/{model}:streamGenerateContent?alt=sse` and turns
//! each server-sent event into one [`GenerateChunk`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CredentialProvider, EventStream, GenerateChunk, GenerateRequest, ModelBackend};
use crate::config::GlobalConfig;
use crate::models::content::{Content, Part, Role};
use crate::models::tool::ToolDefinition;
use crate::{AppError, Result};

/// Request body in the backend's wire format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTools<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTools<'a> {
    function_declarations: &'a [ToolDefinition],
}

impl<'a> From<&'a GenerateRequest> for WireRequest<'a> {
    fn from(request: &'a GenerateRequest) -> Self {
        let system_instruction = request.system_instruction.as_ref().map(|text| Content {
            role: Role::User,
            parts: vec![Part::Text(text.clone())],
        });
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTools {
                function_declarations: &request.tools,
            }]
        };
        Self {
            contents: &request.contents,
            system_instruction,
            tools,
        }
    }
}

/// Streaming client for the generative language API.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
}

impl GeminiBackend {
    /// Build a backend from configuration and a token source.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the HTTP client cannot be constructed.
    pub fn new(config: &GlobalConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.backend.base_url.clone(),
            request_timeout: config.request_timeout(),
            credentials,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }
}

impl ModelBackend for GeminiBackend {
    fn stream_generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream>> + Send + '_>> {
        Box::pin(async move {
            let token = self
                .credentials
                .valid_token()
                .await?
                .ok_or(AppError::AuthRequired)?;

            let body = WireRequest::from(&request);
            let send = self
                .client
                .post(self.endpoint(&request.model))
                .bearer_auth(token)
                .json(&body)
                .send();

            debug!(
                model = request.model.as_str(),
                contents = request.contents.len(),
                tools = request.tools.len(),
                "backend: starting stream"
            );

            let response = tokio::select! {
                biased;

                () = cancel.cancelled() => return Err(AppError::Cancelled),

                result = tokio::time::timeout(self.request_timeout, send) => result
                    .map_err(|_| AppError::Backend(format!(
                        "no response within {:?}", self.request_timeout
                    )))??,
            };

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                warn!(%status, "backend: request rejected");
                return Err(AppError::Backend(format!(
                    "backend returned {status}: {}",
                    detail.trim()
                )));
            }

            let events = response
                .bytes_stream()
                .eventsource()
                .filter_map(|event| async move {
                    match event {
                        Ok(event) if event.data.trim().is_empty() => None,
                        Ok(event) => Some(
                            serde_json::from_str::<GenerateChunk>(&event.data).map_err(|err| {
                                AppError::Backend(format!("malformed stream event: {err}"))
                            }),
                        ),
                        Err(err) => Some(Err(AppError::Backend(format!(
                            "stream read failed: {err}"
                        )))),
                    }
                });

            Ok(events.boxed())
        })
    }
}
