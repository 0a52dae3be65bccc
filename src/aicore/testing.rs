//! In-memory stand-ins for the catalog and the AI platform.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use uuid::Uuid;

use super::client::{AiCorePlatform, ChunkStream};
use super::credentials::{CredentialResolver, PlatformCredential, StaticCredentialStore, TeamCredential};
use super::error::AiCoreError;
use super::types::{
    Attachment, ChatChoice, ChatChunk, ChatDelta, ChatMessage, ChatRequest, ChatResponse,
    ChunkChoice, Configuration, ConfigurationCreated, Deployment, DeploymentChange,
    DeploymentCreated, DeploymentDeleted, DeploymentModified, DeploymentStatus, Model,
    NewConfiguration, StoredFile, TokenUsage,
};
use super::{AiCore, AiCoreSettings};
use crate::catalog::{CatalogUser, Directory};

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDirectory {
    users: HashMap<String, CatalogUser>,
}

impl FakeDirectory {
    pub fn with_user(name: &str, teams: &[&str]) -> Self {
        Self::default().and_user(name, teams)
    }

    pub fn and_user(mut self, name: &str, teams: &[&str]) -> Self {
        self.users.insert(
            name.to_owned(),
            CatalogUser {
                id: Uuid::new_v4(),
                name: name.to_owned(),
                email: Some(format!("{name}@example.com")),
                teams: teams.iter().map(|t| (*t).to_owned()).collect(),
            },
        );
        self
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn find_user(&self, identity: &str) -> anyhow::Result<Option<CatalogUser>> {
        Ok(self.users.get(identity).cloned().or_else(|| {
            self.users
                .values()
                .find(|u| u.email.as_deref() == Some(identity))
                .cloned()
        }))
    }
}

pub fn credential(api_url: &str) -> PlatformCredential {
    PlatformCredential {
        client_id: "client".into(),
        client_secret: "secret".into(),
        auth_url: api_url.to_owned(),
        api_url: api_url.to_owned(),
        resource_group: "default".into(),
    }
}

/// Gateway wired to `directory`, with credentials for `credentialed` teams only.
pub fn core_with(directory: FakeDirectory, credentialed: &[&str], platform: FakePlatform) -> AiCore {
    core_with_settings(directory, credentialed, platform, AiCoreSettings::default())
}

pub fn core_with_settings(
    directory: FakeDirectory,
    credentialed: &[&str],
    platform: FakePlatform,
    settings: AiCoreSettings,
) -> AiCore {
    let store: StaticCredentialStore = credentialed
        .iter()
        .map(|t| ((*t).to_owned(), credential("http://platform.test")))
        .collect();
    AiCore::new(
        CredentialResolver::new(Arc::new(directory), Arc::new(store)),
        Arc::new(platform),
        settings,
    )
}

pub fn deployment(id: &str) -> Deployment {
    Deployment {
        id: id.to_owned(),
        configuration_id: Some("cfg-1".into()),
        configuration_name: None,
        executable_id: None,
        scenario_id: None,
        status: DeploymentStatus::Running,
        status_message: None,
        target_status: Some(DeploymentStatus::Running),
        last_operation: Some("CREATE".into()),
        latest_running_configuration_id: Some("cfg-1".into()),
        ttl: None,
        deployment_url: Some(format!("http://inference.test/deployments/{id}")),
        created_at: None,
        modified_at: None,
    }
}

pub fn configuration(id: &str) -> Configuration {
    Configuration {
        id: id.to_owned(),
        name: format!("{id}-name"),
        executable_id: "azure-openai".into(),
        scenario_id: "foundation-models".into(),
        parameter_bindings: Vec::new(),
        input_artifact_bindings: Vec::new(),
        created_at: None,
    }
}

pub fn chunk(content: &str) -> ChatChunk {
    ChatChunk {
        id: "chatcmpl-1".into(),
        created: 1,
        model: "gpt-4o".into(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChatDelta {
                role: None,
                content: Some(content.to_owned()),
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

pub fn reply(content: &str) -> ChatResponse {
    ChatResponse {
        id: "chatcmpl-1".into(),
        created: 1,
        model: "gpt-4o".into(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".into(),
                content: content.to_owned(),
            },
            finish_reason: Some("stop".into()),
        }],
        usage: TokenUsage::new(10, 5),
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Raises its flag when dropped; lets tests observe that an in-flight call was released.
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(Arc::clone(&flag)), flag)
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Scriptable platform; every call is recorded as `"<operation> <team> [<detail>]"`.
#[derive(Default)]
pub struct FakePlatform {
    deployments: HashMap<String, Vec<Deployment>>,
    configurations: HashMap<String, Vec<Configuration>>,
    failing_teams: HashSet<String>,
    chat_reply: Option<ChatResponse>,
    stream_chunks: Vec<ChatChunk>,
    stream_failure: Option<String>,
    endless_stream: Mutex<Option<DropFlag>>,
    stalled_teams: Mutex<HashMap<String, DropFlag>>,
    upload_failure_at: Option<usize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakePlatform {
    pub fn with_deployments(mut self, team: &str, deployments: Vec<Deployment>) -> Self {
        self.deployments.insert(team.to_owned(), deployments);
        self
    }

    pub fn with_configurations(mut self, team: &str, configurations: Vec<Configuration>) -> Self {
        self.configurations.insert(team.to_owned(), configurations);
        self
    }

    pub fn failing_team(mut self, team: &str) -> Self {
        self.failing_teams.insert(team.to_owned());
        self
    }

    pub fn with_chat_reply(mut self, reply: ChatResponse) -> Self {
        self.chat_reply = Some(reply);
        self
    }

    /// Stream `chunks`, then end cleanly or with `failure`.
    pub fn with_stream(mut self, chunks: Vec<ChatChunk>, failure: Option<&str>) -> Self {
        self.stream_chunks = chunks;
        self.stream_failure = failure.map(str::to_owned);
        self
    }

    /// Stream chunks forever; `flag` is dropped together with the stream.
    pub fn with_endless_stream(self, flag: DropFlag) -> Self {
        *self.endless_stream.lock().unwrap() = Some(flag);
        self
    }

    /// Never answer `list_deployments` for `team`; `flag` is dropped with the pending call.
    pub fn stalled_team(self, team: &str, flag: DropFlag) -> Self {
        self.stalled_teams.lock().unwrap().insert(team.to_owned(), flag);
        self
    }

    /// Fail the upload with this zero-based index.
    pub fn failing_upload_at(mut self, index: usize) -> Self {
        self.upload_failure_at = Some(index);
        self
    }

    /// Shared handle to the call log; stays valid after the platform moves into an `AiCore`.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, cred: &TeamCredential, operation: &str, detail: &str) -> Result<(), AiCoreError> {
        let entry = if detail.is_empty() {
            format!("{operation} {}", cred.team)
        } else {
            format!("{operation} {} {detail}", cred.team)
        };
        self.calls.lock().unwrap().push(entry);
        if self.failing_teams.contains(&cred.team) {
            return Err(AiCoreError::Upstream(format!(
                "{operation} for {} returned 500 Internal Server Error",
                cred.team
            )));
        }
        Ok(())
    }

    fn find_deployment(&self, team: &str, id: &str) -> Result<Deployment, AiCoreError> {
        self.deployments
            .get(team)
            .and_then(|ds| ds.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| AiCoreError::NotFound("deployment".into()))
    }
}

#[async_trait]
impl AiCorePlatform for FakePlatform {
    async fn list_deployments(&self, cred: &TeamCredential) -> Result<Vec<Deployment>, AiCoreError> {
        let stalled = self.stalled_teams.lock().unwrap().remove(&cred.team);
        if let Some(flag) = stalled {
            let _held = flag;
            std::future::pending::<()>().await;
        }
        if self.failing_teams.contains(&cred.team) {
            // Fail after one scheduler turn so sibling calls are already in flight.
            tokio::task::yield_now().await;
        }
        self.record(cred, "list_deployments", "")?;
        Ok(self.deployments.get(&cred.team).cloned().unwrap_or_default())
    }

    async fn get_deployment(&self, cred: &TeamCredential, id: &str) -> Result<Deployment, AiCoreError> {
        self.record(cred, "get_deployment", id)?;
        self.find_deployment(&cred.team, id)
    }

    async fn create_deployment(
        &self,
        cred: &TeamCredential,
        configuration_id: &str,
        ttl: Option<&str>,
    ) -> Result<DeploymentCreated, AiCoreError> {
        self.record(cred, "create_deployment", configuration_id)?;
        Ok(DeploymentCreated {
            id: "d-new".into(),
            message: "Deployment scheduled.".into(),
            deployment_url: None,
            status: DeploymentStatus::Unknown,
            ttl: ttl.map(str::to_owned),
        })
    }

    async fn modify_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
        change: &DeploymentChange,
    ) -> Result<DeploymentModified, AiCoreError> {
        self.record(cred, "modify_deployment", id)?;
        self.find_deployment(&cred.team, id)?;
        Ok(DeploymentModified {
            id: id.to_owned(),
            message: "Deployment modification scheduled".into(),
            status: None,
            target_status: change.target_status().map(Into::into),
        })
    }

    async fn delete_deployment(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<DeploymentDeleted, AiCoreError> {
        self.record(cred, "delete_deployment", id)?;
        self.find_deployment(&cred.team, id)?;
        Ok(DeploymentDeleted {
            id: id.to_owned(),
            message: "Deletion scheduled".into(),
        })
    }

    async fn list_configurations(
        &self,
        cred: &TeamCredential,
    ) -> Result<Vec<Configuration>, AiCoreError> {
        self.record(cred, "list_configurations", "")?;
        Ok(self.configurations.get(&cred.team).cloned().unwrap_or_default())
    }

    async fn get_configuration(
        &self,
        cred: &TeamCredential,
        id: &str,
    ) -> Result<Configuration, AiCoreError> {
        self.record(cred, "get_configuration", id)?;
        self.configurations
            .get(&cred.team)
            .and_then(|cs| cs.iter().find(|c| c.id == id))
            .cloned()
            .ok_or_else(|| AiCoreError::NotFound("configuration".into()))
    }

    async fn create_configuration(
        &self,
        cred: &TeamCredential,
        configuration: &NewConfiguration,
    ) -> Result<ConfigurationCreated, AiCoreError> {
        self.record(cred, "create_configuration", &configuration.name)?;
        Ok(ConfigurationCreated {
            id: "cfg-new".into(),
            message: "Configuration created".into(),
        })
    }

    async fn list_models(&self, cred: &TeamCredential, scenario_id: &str) -> Result<Vec<Model>, AiCoreError> {
        self.record(cred, "list_models", scenario_id)?;
        Ok(vec![Model {
            model: "gpt-4o".into(),
            executable_id: Some("azure-openai".into()),
            description: None,
            versions: Vec::new(),
        }])
    }

    async fn chat(
        &self,
        cred: &TeamCredential,
        deployment_url: &str,
        _request: &ChatRequest,
    ) -> Result<ChatResponse, AiCoreError> {
        self.record(cred, "chat", deployment_url)?;
        self.chat_reply
            .clone()
            .ok_or_else(|| AiCoreError::Upstream("no reply scripted".into()))
    }

    async fn chat_stream(
        &self,
        cred: &TeamCredential,
        deployment_url: &str,
        _request: &ChatRequest,
    ) -> Result<ChunkStream, AiCoreError> {
        self.record(cred, "chat_stream", deployment_url)?;
        let endless = self.endless_stream.lock().unwrap().take();
        if let Some(flag) = endless {
            let ticks = stream::unfold(flag, |flag| async move {
                Some((Ok::<_, AiCoreError>(chunk("tick")), flag))
            });
            return Ok(ticks.boxed());
        }
        let mut items: Vec<Result<ChatChunk, AiCoreError>> =
            self.stream_chunks.iter().cloned().map(Ok).collect();
        if let Some(failure) = &self.stream_failure {
            items.push(Err(AiCoreError::Upstream(failure.clone())));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn upload_file(
        &self,
        cred: &TeamCredential,
        path: &str,
        _file: &Attachment,
    ) -> Result<StoredFile, AiCoreError> {
        let index = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("upload_file "))
            .count();
        self.record(cred, "upload_file", path)?;
        if self.upload_failure_at == Some(index) {
            return Err(AiCoreError::Upstream("file request returned 500".into()));
        }
        Ok(StoredFile {
            message: "File creation response".into(),
            url: format!("ai://default/{path}"),
        })
    }
}
