use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::credentials::TeamCredential;
use super::error::AiCoreError;
use super::sse::{DONE_MARKER, SseDecoder};
use super::types::{
    Attachment, ChatChoice, ChatChunk, ChatDelta, ChatMessage, ChatRequest, ChatResponse,
    ChunkChoice, Collection, Configuration, ConfigurationCreated, Deployment, DeploymentChange,
    DeploymentCreated, DeploymentDeleted, DeploymentModified, Model, NewConfiguration, StoredFile,
    TokenUsage,
};

/// `api-version` query parameter sent with OpenAI-compatible inference calls.
pub const INFERENCE_API_VERSION: &str = "2024-02-01";

const RESOURCE_GROUP_HEADER: &str = "AI-Resource-Group";
const ERROR_BODY_EXCERPT: usize = 512;

/// Incremental chat frames relayed from an upstream event stream.
pub type ChunkStream = BoxStream<'static, Result<ChatChunk, AiCoreError>>;

/// Operations of the AI platform used by the gateway. Every call acts as one team.
#[async_trait]
pub trait AiCorePlatform: Send + Sync {
    async fn list_deployments(&self, cred: &TeamCredential) -> Result<Vec<Deployment>, AiCoreError>;

    async fn get_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<Deployment, AiCoreError>;

    async fn create_deployment(
        &self,
        cred: &TeamCredential,
        configuration_id: &str,
        ttl: Option<&str>,
    ) -> Result<DeploymentCreated, AiCoreError>;

    async fn modify_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
        change: &DeploymentChange,
    ) -> Result<DeploymentModified, AiCoreError>;

    async fn delete_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<DeploymentDeleted, AiCoreError>;

    async fn list_configurations(
        &self,
        cred: &TeamCredential,
    ) -> Result<Vec<Configuration>, AiCoreError>;

    async fn get_configuration(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<Configuration, AiCoreError>;

    async fn create_configuration(
        &self,
        cred: &TeamCredential,
        configuration: &NewConfiguration,
    ) -> Result<ConfigurationCreated, AiCoreError>;

    async fn list_models(
        &self,
        cred: &TeamCredential,
        scenario_id: &str,
    ) -> Result<Vec<Model>, AiCoreError>;

    /// Buffered completion against a deployment's inference URL.
    async fn chat(
        &self,
        cred: &TeamCredential,
        deployment_url: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AiCoreError>;

    /// Open a streamed completion. Dropping the returned stream releases the connection.
    async fn chat_stream(
        &self,
        cred: &TeamCredential,
        deployment_url: &str,
        request: &ChatRequest,
    ) -> Result<ChunkStream, AiCoreError>;

    async fn upload_file(
        &self,
        cred: &TeamCredential,
        path: &str,
        file: &Attachment,
    ) -> Result<StoredFile, AiCoreError>;
}

// ---------------------------------------------------------------------------
// Upstream wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Default)]
struct UpstreamMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    message: Option<UpstreamMessage>,
    #[serde(default)]
    delta: Option<UpstreamMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct UpstreamCompletion {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
    #[serde(default)]
    usage: Option<UpstreamUsage>,
}

#[derive(Deserialize)]
struct UpstreamErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamErrorEnvelope {
    error: UpstreamErrorDetail,
}

impl From<UpstreamUsage> for TokenUsage {
    fn from(u: UpstreamUsage) -> Self {
        Self::new(u.prompt_tokens, u.completion_tokens)
    }
}

impl From<UpstreamCompletion> for ChatResponse {
    fn from(c: UpstreamCompletion) -> Self {
        let choices = c
            .choices
            .into_iter()
            .map(|choice| {
                let message = choice.message.unwrap_or_default();
                ChatChoice {
                    index: choice.index,
                    message: ChatMessage {
                        role: message.role.unwrap_or_else(|| "assistant".into()),
                        content: message.content.unwrap_or_default(),
                    },
                    finish_reason: choice.finish_reason,
                }
            })
            .collect();
        Self {
            id: c.id,
            created: c.created,
            model: c.model,
            choices,
            usage: c.usage.map(TokenUsage::from).unwrap_or_default(),
        }
    }
}

impl From<UpstreamCompletion> for ChatChunk {
    fn from(c: UpstreamCompletion) -> Self {
        let choices = c
            .choices
            .into_iter()
            .map(|choice| {
                let delta = choice.delta.or(choice.message).unwrap_or_default();
                ChunkChoice {
                    index: choice.index,
                    delta: ChatDelta {
                        role: delta.role,
                        content: delta.content,
                    },
                    finish_reason: choice.finish_reason,
                }
            })
            .collect();
        Self {
            id: c.id,
            created: c.created,
            model: c.model,
            choices,
            usage: c.usage.map(TokenUsage::from),
        }
    }
}

/// Parse one upstream stream payload. In-band error objects become errors.
fn parse_chunk(data: &str) -> Result<ChatChunk, AiCoreError> {
    if let Ok(envelope) = serde_json::from_str::<UpstreamErrorEnvelope>(data) {
        return Err(AiCoreError::Upstream(
            envelope
                .error
                .message
                .unwrap_or_else(|| "inference stream reported an error".into()),
        ));
    }
    serde_json::from_str::<UpstreamCompletion>(data)
        .map(ChatChunk::from)
        .map_err(|e| AiCoreError::Upstream(format!("malformed stream chunk: {e}")))
}

// ---------------------------------------------------------------------------
// Upstream stream adapter
// ---------------------------------------------------------------------------

struct ChunkDecoder {
    bytes: BoxStream<'static, Result<Bytes, AiCoreError>>,
    decoder: SseDecoder,
    queued: VecDeque<String>,
    finished: bool,
    /// Set when the byte stream ended without the done marker.
    closed_early: bool,
}

/// Turn an upstream SSE byte stream into chat chunks.
///
/// Ends cleanly on the `[DONE]` marker; an upstream that closes before sending it yields
/// a final error item.
pub fn decode_chunks<S, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<AiCoreError>,
{
    let state = ChunkDecoder {
        bytes: bytes.map(|item| item.map_err(Into::into)).boxed(),
        decoder: SseDecoder::new(),
        queued: VecDeque::new(),
        finished: false,
        closed_early: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.queued.pop_front() {
                if data.trim() == DONE_MARKER {
                    return None;
                }
                return match parse_chunk(&data) {
                    Ok(chunk) => Some((Ok(chunk), st)),
                    Err(e) => {
                        st.finished = true;
                        st.closed_early = false;
                        st.queued.clear();
                        Some((Err(e), st))
                    }
                };
            }
            if st.finished {
                if std::mem::take(&mut st.closed_early) {
                    return Some((
                        Err(AiCoreError::Upstream(
                            "inference stream closed before completion".into(),
                        )),
                        st,
                    ));
                }
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => st.queued.extend(st.decoder.push(&bytes)),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    st.closed_early = true;
                    st.queued.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`AiCorePlatform`] over the platform's REST API.
#[derive(Clone)]
pub struct HttpPlatform {
    http: reqwest::Client,
    inference_timeout: Duration,
}

impl HttpPlatform {
    pub fn new(connect_timeout: Duration, inference_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("portal-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            inference_timeout,
        })
    }

    fn api_url(cred: &TeamCredential, path: &str) -> String {
        join_url(&cred.credential.api_url, path)
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn access_token(&self, cred: &TeamCredential) -> Result<String, AiCoreError> {
        let c = &cred.credential;
        let resp = self
            .http
            .post(join_url(&c.auth_url, "oauth/token"))
            .basic_auth(&c.client_id, Some(&c.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let resp = check_status(resp, "access token").await?;
        let token: TokenResponse = resp.json().await?;
        Ok(token.access_token)
    }

    async fn request(
        &self,
        cred: &TeamCredential,
        method: Method,
        url: &str,
    ) -> Result<RequestBuilder, AiCoreError> {
        let token = self.access_token(cred).await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(RESOURCE_GROUP_HEADER, &cred.credential.resource_group))
    }

    async fn send_json<T: DeserializeOwned>(
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, AiCoreError> {
        let resp = check_status(builder.send().await?, what).await?;
        Ok(resp.json().await?)
    }

    fn inference_body(request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "messages": request.messages,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }
}

#[async_trait]
impl AiCorePlatform for HttpPlatform {
    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn list_deployments(&self, cred: &TeamCredential) -> Result<Vec<Deployment>, AiCoreError> {
        let url = Self::api_url(cred, "v2/lm/deployments");
        let builder = self.request(cred, Method::GET, &url).await?;
        let page: Collection<Deployment> = Self::send_json(builder, "deployments").await?;
        Ok(page.resources)
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn get_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<Deployment, AiCoreError> {
        let url = Self::api_url(cred, &format!("v2/lm/deployments/{id}"));
        let builder = self.request(cred, Method::GET, &url).await?;
        Self::send_json(builder, "deployment").await
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn create_deployment(
        &self,
        cred: &TeamCredential,
        configuration_id: &str,
        ttl: Option<&str>,
    ) -> Result<DeploymentCreated, AiCoreError> {
        let url = Self::api_url(cred, "v2/lm/deployments");
        let mut body = serde_json::json!({ "configurationId": configuration_id });
        if let Some(ttl) = ttl {
            body["ttl"] = serde_json::json!(ttl);
        }
        let builder = self.request(cred, Method::POST, &url).await?.json(&body);
        Self::send_json(builder, "configuration").await
    }

    #[tracing::instrument(skip(self, cred, change), fields(team = %cred.team), err)]
    async fn modify_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
        change: &DeploymentChange,
    ) -> Result<DeploymentModified, AiCoreError> {
        let url = Self::api_url(cred, &format!("v2/lm/deployments/{id}"));
        let builder = self
            .request(cred, Method::PATCH, &url)
            .await?
            .json(&change.to_body());
        Self::send_json(builder, "deployment").await
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn delete_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<DeploymentDeleted, AiCoreError> {
        let url = Self::api_url(cred, &format!("v2/lm/deployments/{id}"));
        let builder = self.request(cred, Method::DELETE, &url).await?;
        Self::send_json(builder, "deployment").await
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn list_configurations(
        &self,
        cred: &TeamCredential,
    ) -> Result<Vec<Configuration>, AiCoreError> {
        let url = Self::api_url(cred, "v2/lm/configurations");
        let builder = self.request(cred, Method::GET, &url).await?;
        let page: Collection<Configuration> = Self::send_json(builder, "configurations").await?;
        Ok(page.resources)
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn get_configuration(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<Configuration, AiCoreError> {
        let url = Self::api_url(cred, &format!("v2/lm/configurations/{id}"));
        let builder = self.request(cred, Method::GET, &url).await?;
        Self::send_json(builder, "configuration").await
    }

    #[tracing::instrument(skip(self, cred, configuration), fields(team = %cred.team, name = %configuration.name), err)]
    async fn create_configuration(
        &self,
        cred: &TeamCredential,
        configuration: &NewConfiguration,
    ) -> Result<ConfigurationCreated, AiCoreError> {
        let url = Self::api_url(cred, "v2/lm/configurations");
        let builder = self
            .request(cred, Method::POST, &url)
            .await?
            .json(configuration);
        Self::send_json(builder, "scenario").await
    }

    #[tracing::instrument(skip(self, cred), fields(team = %cred.team), err)]
    async fn list_models(
        &self,
        cred: &TeamCredential,
        scenario_id: &str,
    ) -> Result<Vec<Model>, AiCoreError> {
        let url = Self::api_url(cred, &format!("v2/lm/scenarios/{scenario_id}/models"));
        let builder = self.request(cred, Method::GET, &url).await?;
        let page: Collection<Model> = Self::send_json(builder, "scenario").await?;
        Ok(page.resources)
    }

    #[tracing::instrument(skip(self, cred, request), fields(team = %cred.team, deployment_id = %request.deployment_id), err)]
    async fn chat(
        &self,
        cred: &TeamCredential,
        deployment_url: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AiCoreError> {
        let url = join_url(deployment_url, "chat/completions");
        let builder = self
            .request(cred, Method::POST, &url)
            .await?
            .query(&[("api-version", INFERENCE_API_VERSION)])
            .timeout(self.inference_timeout)
            .json(&Self::inference_body(request, false));
        let completion: UpstreamCompletion = Self::send_json(builder, "deployment").await?;
        Ok(completion.into())
    }

    #[tracing::instrument(skip(self, cred, request), fields(team = %cred.team, deployment_id = %request.deployment_id), err)]
    async fn chat_stream(
        &self,
        cred: &TeamCredential,
        deployment_url: &str,
        request: &ChatRequest,
    ) -> Result<ChunkStream, AiCoreError> {
        let url = join_url(deployment_url, "chat/completions");
        let resp = self
            .request(cred, Method::POST, &url)
            .await?
            .query(&[("api-version", INFERENCE_API_VERSION)])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&Self::inference_body(request, true))
            .send()
            .await?;
        let resp = check_status(resp, "deployment").await?;
        Ok(decode_chunks(resp.bytes_stream()))
    }

    #[tracing::instrument(skip(self, cred, file), fields(team = %cred.team, size = file.size()), err)]
    async fn upload_file(
        &self,
        cred: &TeamCredential,
        path: &str,
        file: &Attachment,
    ) -> Result<StoredFile, AiCoreError> {
        let url = Self::api_url(cred, &format!("v2/lm/dataset/files/{path}"));
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".into());
        let builder = self
            .request(cred, Method::PUT, &url)
            .await?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(file.content.clone());
        Self::send_json(builder, "file").await
    }
}

/// Join a base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map non-success upstream statuses onto the error taxonomy.
async fn check_status(resp: Response, what: &str) -> Result<Response, AiCoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    Err(match status {
        StatusCode::NOT_FOUND => AiCoreError::NotFound(what.to_owned()),
        StatusCode::TOO_MANY_REQUESTS => AiCoreError::RateLimited(excerpt),
        _ => AiCoreError::Upstream(format!("{what} request returned {status}: {excerpt}")),
    })
}
