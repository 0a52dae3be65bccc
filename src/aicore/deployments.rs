use serde::Deserialize;

use super::AiCore;
use super::configurations;
use super::credentials::TeamCredential;
use super::error::AiCoreError;
use super::types::{
    ConfigurationRequest, Deployment, DeploymentChange, DeploymentCreated, DeploymentDeleted,
    DeploymentModified, DeploymentStatus, NewConfiguration, TargetStatus,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    pub configuration_id: Option<String>,
    pub configuration_request: Option<ConfigurationRequest>,
    pub ttl: Option<String>,
}

/// Where the configuration of a new deployment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationSource {
    ById(String),
    Inline(NewConfiguration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub source: ConfigurationSource,
    pub ttl: Option<String>,
}

impl CreateDeploymentRequest {
    /// Exactly one configuration input must be present. Blank ids count as absent.
    pub fn into_plan(self) -> Result<DeploymentPlan, AiCoreError> {
        let configuration_id = self
            .configuration_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty());
        let source = match (configuration_id, self.configuration_request) {
            (Some(_), Some(_)) => return Err(AiCoreError::BothConfigurationInputs),
            (None, None) => return Err(AiCoreError::MissingConfigurationInput),
            (Some(id), None) => ConfigurationSource::ById(id),
            (None, Some(request)) => ConfigurationSource::Inline(request.validate()?),
        };
        let ttl = match self.ttl.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()) {
            Some(ttl) if !is_valid_ttl(&ttl) => {
                return Err(AiCoreError::InvalidInput(format!(
                    "ttl must be a positive number followed by m, h or d (got {ttl})"
                )));
            }
            ttl => ttl,
        };
        Ok(DeploymentPlan { source, ttl })
    }
}

fn is_valid_ttl(ttl: &str) -> bool {
    let Some(digits) = ttl.strip_suffix(['m', 'h', 'd']) else {
        return false;
    };
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && digits.parse::<u32>().is_ok_and(|n| n > 0)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyDeploymentRequest {
    pub target_status: Option<TargetStatus>,
    pub configuration_id: Option<String>,
}

impl ModifyDeploymentRequest {
    pub fn into_change(self) -> Result<DeploymentChange, AiCoreError> {
        let configuration_id = self
            .configuration_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty());
        DeploymentChange::from_parts(self.target_status, configuration_id)
            .ok_or(AiCoreError::MissingTargetStatusOrConfigId)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create a deployment, creating its configuration first when given inline.
///
/// Creation is asynchronous on the platform; the result always reports `PENDING`.
#[tracing::instrument(skip(core, plan), err)]
pub async fn create(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    plan: DeploymentPlan,
) -> Result<DeploymentCreated, AiCoreError> {
    let cred = core.resolver.resolve_scoped(identity, team).await?;
    let configuration_id = match plan.source {
        ConfigurationSource::ById(id) => id,
        ConfigurationSource::Inline(new) => configurations::create_with(core, &cred, new).await?.id,
    };
    let mut created = core
        .platform
        .create_deployment(&cred, &configuration_id, plan.ttl.as_deref())
        .await?;
    created.status = DeploymentStatus::Pending;
    tracing::info!(
        team = %cred.team,
        deployment_id = %created.id,
        %configuration_id,
        "deployment requested"
    );
    Ok(created)
}

/// Find the team that owns a deployment.
///
/// With an explicit team only that team is asked. Otherwise every team of the user that has
/// credentials is tried in membership order and the first hit wins.
pub async fn locate(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    id: &str,
) -> Result<(TeamCredential, Deployment), AiCoreError> {
    if let Some(team) = team {
        let cred = core.resolver.resolve(identity, team).await?;
        let deployment = core.platform.get_deployment(&cred, id).await?;
        return Ok((cred, deployment));
    }

    let user = core.resolver.user(identity).await?;
    let teams = core.resolver.accessible_teams(&user).await?;
    if teams.is_empty() {
        return Err(AiCoreError::UserNotAssignedToTeam {
            user: user.name,
            team: None,
        });
    }
    for cred in teams {
        match core.platform.get_deployment(&cred, id).await {
            Ok(deployment) => return Ok((cred, deployment)),
            Err(AiCoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Err(AiCoreError::NotFound("deployment".into()))
}

/// Fetch a deployment and fill in the configuration details the platform omits.
#[tracing::instrument(skip(core), err)]
pub async fn get(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    id: &str,
) -> Result<Deployment, AiCoreError> {
    let (cred, mut deployment) = locate(core, identity, team, id).await?;
    enrich(core, &cred, &mut deployment).await?;
    Ok(deployment)
}

async fn enrich(
    core: &AiCore,
    cred: &TeamCredential,
    deployment: &mut Deployment,
) -> Result<(), AiCoreError> {
    let complete = deployment.configuration_name.is_some()
        && deployment.executable_id.is_some()
        && deployment.scenario_id.is_some();
    let Some(configuration_id) = deployment.configuration_id.clone() else {
        return Ok(());
    };
    if complete {
        return Ok(());
    }
    match core.platform.get_configuration(cred, &configuration_id).await {
        Ok(cfg) => {
            deployment.configuration_name.get_or_insert(cfg.name);
            deployment.executable_id.get_or_insert(cfg.executable_id);
            deployment.scenario_id.get_or_insert(cfg.scenario_id);
            Ok(())
        }
        // Configurations can be deleted while deployments built from them live on.
        Err(AiCoreError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[tracing::instrument(skip(core, change), err)]
pub async fn modify(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    id: &str,
    change: DeploymentChange,
) -> Result<DeploymentModified, AiCoreError> {
    let (cred, current) = locate(core, identity, team, id).await?;
    let mut modified = core.platform.modify_deployment(&cred, id, &change).await?;
    if modified.status.is_none() {
        modified.status = Some(current.status);
    }
    if modified.target_status.is_none() {
        modified.target_status = change.target_status().map(Into::into);
    }
    tracing::info!(
        team = %cred.team,
        deployment_id = %id,
        target_status = ?change.target_status(),
        configuration_id = ?change.configuration_id(),
        "deployment modification requested"
    );
    Ok(modified)
}

#[tracing::instrument(skip(core), err)]
pub async fn delete(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    id: &str,
) -> Result<DeploymentDeleted, AiCoreError> {
    let (cred, _) = locate(core, identity, team, id).await?;
    let deleted = core.platform.delete_deployment(&cred, id).await?;
    tracing::info!(team = %cred.team, deployment_id = %id, "deployment deletion requested");
    Ok(deleted)
}
