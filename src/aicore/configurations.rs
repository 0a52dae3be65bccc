use chrono::Utc;

use super::AiCore;
use super::credentials::TeamCredential;
use super::error::AiCoreError;
use super::types::{Configuration, ConfigurationRequest, NewConfiguration};
use crate::validation::missing_fields;

impl ConfigurationRequest {
    /// Check required fields, reporting all missing ones together. Blank counts as missing.
    pub fn validate(self) -> Result<NewConfiguration, AiCoreError> {
        let missing = missing_fields(&[
            ("name", self.name.as_deref()),
            ("executableId", self.executable_id.as_deref()),
            ("scenarioId", self.scenario_id.as_deref()),
        ]);
        if !missing.is_empty() {
            return Err(AiCoreError::MissingFields(
                missing.into_iter().map(str::to_owned).collect(),
            ));
        }
        Ok(NewConfiguration {
            name: self.name.unwrap_or_default().trim().to_owned(),
            executable_id: self.executable_id.unwrap_or_default().trim().to_owned(),
            scenario_id: self.scenario_id.unwrap_or_default().trim().to_owned(),
            parameter_bindings: self.parameter_bindings,
            input_artifact_bindings: self.input_artifact_bindings,
        })
    }
}

/// Create a configuration for the given team (primary team when `None`).
///
/// The request is validated before any credential lookup or upstream call.
#[tracing::instrument(skip(core, request), err)]
pub async fn create(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    request: ConfigurationRequest,
) -> Result<Configuration, AiCoreError> {
    let new = request.validate()?;
    let cred = core.resolver.resolve_scoped(identity, team).await?;
    create_with(core, &cred, new).await
}

/// Create with an already-resolved credential.
pub(crate) async fn create_with(
    core: &AiCore,
    cred: &TeamCredential,
    new: NewConfiguration,
) -> Result<Configuration, AiCoreError> {
    let created = core.platform.create_configuration(cred, &new).await?;
    tracing::info!(team = %cred.team, configuration_id = %created.id, "configuration created");
    Ok(Configuration {
        id: created.id,
        name: new.name,
        executable_id: new.executable_id,
        scenario_id: new.scenario_id,
        parameter_bindings: new.parameter_bindings,
        input_artifact_bindings: new.input_artifact_bindings,
        created_at: Some(Utc::now()),
    })
}

#[tracing::instrument(skip(core), err)]
pub async fn list(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
) -> Result<Vec<Configuration>, AiCoreError> {
    let cred = core.resolver.resolve_scoped(identity, team).await?;
    core.platform.list_configurations(&cred).await
}
