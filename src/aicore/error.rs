use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum AiCoreError {
    #[error("user not found in catalog: {0}")]
    UserNotFoundInDb(String),

    #[error(
        "user {user} is not assigned to {}",
        .team.as_deref().unwrap_or("any team with AI platform access")
    )]
    UserNotAssignedToTeam { user: String, team: Option<String> },

    #[error("no AI platform credentials configured for team: {0}")]
    CredentialsNotFound(String),

    #[error("provide either configurationId or configurationRequest, not both")]
    BothConfigurationInputs,

    #[error("either configurationId or configurationRequest is required")]
    MissingConfigurationInput,

    #[error("either targetStatus or configurationId is required")]
    MissingTargetStatusOrConfigId,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("no files provided")]
    NoFilesProvided,

    #[error("combined file size {actual} bytes exceeds limit of {limit} bytes")]
    CombinedFileSizeExceeded { actual: usize, limit: usize },

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("deployment {0} is not ready for inference")]
    DeploymentNotReady(String),

    #[error("rate limited by AI platform: {0}")]
    RateLimited(String),

    #[error("AI platform request failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AiCoreError {
    /// Credential gaps are the only per-team failure the deployment fan-out absorbs.
    pub fn is_missing_credentials(&self) -> bool {
        matches!(self, Self::CredentialsNotFound(_))
    }
}

impl From<reqwest::Error> for AiCoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Upstream(format!("request timed out: {err}"));
        }
        if err.is_decode() {
            return Self::Upstream(format!("malformed response: {err}"));
        }
        Self::Upstream(err.to_string())
    }
}

impl From<AiCoreError> for ApiError {
    fn from(err: AiCoreError) -> Self {
        match err {
            AiCoreError::UserNotFoundInDb(_)
            | AiCoreError::UserNotAssignedToTeam { .. }
            | AiCoreError::CredentialsNotFound(_) => Self::Forbidden(err.to_string()),
            AiCoreError::MissingFields(fields) => Self::Validation(
                fields.into_iter().map(|f| format!("{f} is required")).collect(),
            ),
            AiCoreError::BothConfigurationInputs
            | AiCoreError::MissingConfigurationInput
            | AiCoreError::MissingTargetStatusOrConfigId
            | AiCoreError::NoFilesProvided
            | AiCoreError::CombinedFileSizeExceeded { .. }
            | AiCoreError::InvalidInput(_) => Self::BadRequest(err.to_string()),
            AiCoreError::NotFound(_) => Self::NotFound(err.to_string()),
            AiCoreError::DeploymentNotReady(_) => Self::Conflict(err.to_string()),
            AiCoreError::RateLimited(_) => Self::TooManyRequests(err.to_string()),
            AiCoreError::Upstream(_) => Self::BadGateway(err.to_string()),
            AiCoreError::Other(e) => Self::Internal(e),
        }
    }
}
