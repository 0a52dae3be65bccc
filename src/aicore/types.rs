use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

/// Deployment status as observed on the platform. Unknown values are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
    Dead,
    Stopping,
    Stopped,
    Deleting,
    #[default]
    Unknown,
    #[serde(untagged)]
    Other(String),
}

/// Status a caller may ask a deployment to converge to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetStatus {
    Running,
    Stopped,
    Deleted,
}

impl From<TargetStatus> for DeploymentStatus {
    fn from(target: TargetStatus) -> Self {
        match target {
            TargetStatus::Running => Self::Running,
            TargetStatus::Stopped => Self::Stopped,
            TargetStatus::Deleted => Self::Other("DELETED".into()),
        }
    }
}

/// A validated modification: at least one of target status or configuration is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentChange {
    Status(TargetStatus),
    Configuration(String),
    Both {
        configuration_id: String,
        target_status: TargetStatus,
    },
}

impl DeploymentChange {
    pub fn from_parts(
        target_status: Option<TargetStatus>,
        configuration_id: Option<String>,
    ) -> Option<Self> {
        match (target_status, configuration_id) {
            (Some(target_status), Some(configuration_id)) => Some(Self::Both {
                configuration_id,
                target_status,
            }),
            (Some(status), None) => Some(Self::Status(status)),
            (None, Some(id)) => Some(Self::Configuration(id)),
            (None, None) => None,
        }
    }

    pub fn target_status(&self) -> Option<TargetStatus> {
        match self {
            Self::Status(s) | Self::Both { target_status: s, .. } => Some(*s),
            Self::Configuration(_) => None,
        }
    }

    pub fn configuration_id(&self) -> Option<&str> {
        match self {
            Self::Configuration(id)
            | Self::Both {
                configuration_id: id,
                ..
            } => Some(id),
            Self::Status(_) => None,
        }
    }

    /// Upstream PATCH body.
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(status) = self.target_status() {
            body.insert("targetStatus".into(), serde_json::json!(status));
        }
        if let Some(id) = self.configuration_id() {
            body.insert("configurationId".into(), serde_json::json!(id));
        }
        serde_json::Value::Object(body)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub configuration_id: Option<String>,
    #[serde(default)]
    pub configuration_name: Option<String>,
    #[serde(default)]
    pub executable_id: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<String>,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub target_status: Option<DeploymentStatus>,
    #[serde(default)]
    pub last_operation: Option<String>,
    #[serde(default)]
    pub latest_running_configuration_id: Option<String>,
    #[serde(default)]
    pub ttl: Option<String>,
    #[serde(default)]
    pub deployment_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Inference base URL, present once the platform has exposed the deployment.
    pub fn inference_url(&self) -> Option<&str> {
        self.deployment_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Deployments visible through one team's credential.
#[derive(Debug, Clone, Serialize)]
pub struct TeamDeployments {
    pub team: String,
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedDeployments {
    pub count: usize,
    pub deployments: Vec<TeamDeployments>,
}

/// Platform acknowledgement of a deployment creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCreated {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deployment_url: Option<String>,
    #[serde(default)]
    pub status: DeploymentStatus,
    #[serde(default)]
    pub ttl: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentModified {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<DeploymentStatus>,
    #[serde(default)]
    pub target_status: Option<DeploymentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDeleted {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

/// Upstream collection envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
}

// ---------------------------------------------------------------------------
// Configurations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBinding {
    pub key: String,
    pub artifact_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: String,
    pub name: String,
    pub executable_id: String,
    pub scenario_id: String,
    #[serde(default)]
    pub parameter_bindings: Vec<ParameterBinding>,
    #[serde(default)]
    pub input_artifact_bindings: Vec<ArtifactBinding>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Configuration creation request as received from callers; required fields are checked
/// by [`ConfigurationRequest::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationRequest {
    pub name: Option<String>,
    pub executable_id: Option<String>,
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub parameter_bindings: Vec<ParameterBinding>,
    #[serde(default)]
    pub input_artifact_bindings: Vec<ArtifactBinding>,
}

/// A configuration request with every required field present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConfiguration {
    pub name: String,
    pub executable_id: String,
    pub scenario_id: String,
    pub parameter_bindings: Vec<ParameterBinding>,
    pub input_artifact_bindings: Vec<ArtifactBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationCreated {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub name: String,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub context_length: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub model: String,
    #[serde(default)]
    pub executable_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub versions: Vec<ModelVersion>,
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Validated chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub deployment_id: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// One incremental frame of a streamed chat response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatChunk {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// A file received in an upload request; lives only for the request.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl Attachment {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(default)]
    pub message: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub size: usize,
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub count: usize,
    pub files: Vec<UploadedFile>,
}
