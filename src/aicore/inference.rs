//! Chat inference against a deployment, buffered or relayed as server-sent events.

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;

use super::AiCore;
use super::client::ChunkStream;
use super::credentials::TeamCredential;
use super::deployments;
use super::error::AiCoreError;
use super::sse::{DONE_MARKER, frame};
use super::types::{ChatMessage, ChatRequest, ChatResponse};

pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

/// Chat request as received from callers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    /// Owning team; resolved from the caller's teams when absent.
    pub team: Option<String>,
}

/// A validated chat call.
#[derive(Debug, Clone)]
pub struct InferenceCall {
    pub request: ChatRequest,
    pub stream: bool,
    pub team: Option<String>,
}

impl ChatRequestBody {
    pub fn validate(self) -> Result<InferenceCall, AiCoreError> {
        let deployment_id = self
            .deployment_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AiCoreError::MissingFields(vec!["deploymentId".into()]))?;
        if self.messages.is_empty() {
            return Err(AiCoreError::InvalidInput(
                "messages must contain at least one message".into(),
            ));
        }
        if self.temperature.is_some_and(|t| !(0.0..=2.0).contains(&t)) {
            return Err(AiCoreError::InvalidInput(
                "temperature must be between 0 and 2".into(),
            ));
        }
        if self.max_tokens == Some(0) {
            return Err(AiCoreError::InvalidInput(
                "maxTokens must be greater than 0".into(),
            ));
        }
        Ok(InferenceCall {
            request: ChatRequest {
                deployment_id,
                messages: self.messages,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            stream: self.stream,
            team: self.team.filter(|t| !t.trim().is_empty()),
        })
    }
}

/// Resolve the deployment's team credential and inference URL.
async fn target(
    core: &AiCore,
    identity: &str,
    call: &InferenceCall,
) -> Result<(TeamCredential, String), AiCoreError> {
    let id = &call.request.deployment_id;
    let (cred, deployment) =
        deployments::locate(core, identity, call.team.as_deref(), id).await?;
    let url = deployment
        .inference_url()
        .ok_or_else(|| AiCoreError::DeploymentNotReady(id.clone()))?
        .to_owned();
    Ok((cred, url))
}

/// Buffered completion: the full assistant reply with token usage.
#[tracing::instrument(skip(core, call), fields(deployment_id = %call.request.deployment_id), err)]
pub async fn chat(
    core: &AiCore,
    identity: &str,
    call: &InferenceCall,
) -> Result<ChatResponse, AiCoreError> {
    let (cred, url) = target(core, identity, call).await?;
    let response = core.platform.chat(&cred, &url, &call.request).await?;
    tracing::info!(
        deployment_id = %call.request.deployment_id,
        total_tokens = response.usage.total_tokens,
        "chat completion served"
    );
    Ok(response)
}

// ---------------------------------------------------------------------------
// Streaming relay
// ---------------------------------------------------------------------------

/// Logs when the caller goes away before the relay finished.
struct RelayGuard {
    deployment_id: String,
    finished: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(
                deployment_id = %self.deployment_id,
                "client disconnected, upstream stream released"
            );
        }
    }
}

enum Relay {
    Connecting {
        core: AiCore,
        identity: String,
        call: InferenceCall,
    },
    Streaming {
        upstream: ChunkStream,
        guard: RelayGuard,
    },
    Finished,
}

/// SSE frames for a streamed chat call.
///
/// Headers are already committed when this runs, so every failure, including those before
/// the first chunk, becomes a terminal `error` event. A clean upstream end yields `done`.
/// Dropping the stream drops the upstream connection.
pub fn relay(
    core: AiCore,
    identity: String,
    call: InferenceCall,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let start = Relay::Connecting {
        core,
        identity,
        call,
    };
    stream::unfold(start, |state| async move {
        let mut state = state;
        loop {
            state = match state {
                Relay::Connecting {
                    core,
                    identity,
                    call,
                } => match open(&core, &identity, &call).await {
                    Ok(upstream) => Relay::Streaming {
                        upstream,
                        guard: RelayGuard {
                            deployment_id: call.request.deployment_id,
                            finished: false,
                        },
                    },
                    Err(e) => return Some((error_frame(&e), Relay::Finished)),
                },
                Relay::Streaming {
                    mut upstream,
                    mut guard,
                } => {
                    return match upstream.next().await {
                        Some(Ok(chunk)) => match serde_json::to_string(&chunk) {
                            Ok(json) => Some((
                                frame(EVENT_MESSAGE, &json),
                                Relay::Streaming { upstream, guard },
                            )),
                            Err(e) => {
                                guard.finished = true;
                                Some((error_frame(&AiCoreError::Other(e.into())), Relay::Finished))
                            }
                        },
                        Some(Err(e)) => {
                            guard.finished = true;
                            Some((error_frame(&e), Relay::Finished))
                        }
                        None => {
                            guard.finished = true;
                            tracing::debug!(deployment_id = %guard.deployment_id, "chat stream completed");
                            Some((frame(EVENT_DONE, DONE_MARKER), Relay::Finished))
                        }
                    };
                }
                Relay::Finished => return None,
            };
        }
    })
}

async fn open(
    core: &AiCore,
    identity: &str,
    call: &InferenceCall,
) -> Result<ChunkStream, AiCoreError> {
    let (cred, url) = target(core, identity, call).await?;
    core.platform.chat_stream(&cred, &url, &call.request).await
}

fn error_frame(err: &AiCoreError) -> Bytes {
    tracing::warn!(error = %err, "chat stream failed");
    frame(EVENT_ERROR, &err.to_string())
}
