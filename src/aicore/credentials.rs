use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::AiCoreError;
use crate::catalog::{CatalogUser, Directory};

// ---------------------------------------------------------------------------
// Credential types
// ---------------------------------------------------------------------------

fn default_resource_group() -> String {
    "default".into()
}

/// Client-credentials grant for one tenant of the AI platform.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCredential {
    pub client_id: String,
    pub client_secret: String,
    /// OAuth server base URL; the token endpoint is `{auth_url}/oauth/token`.
    pub auth_url: String,
    /// Platform API base URL.
    pub api_url: String,
    #[serde(default = "default_resource_group")]
    pub resource_group: String,
}

impl fmt::Debug for PlatformCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("api_url", &self.api_url)
            .field("resource_group", &self.resource_group)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TeamCredential {
    pub team: String,
    pub credential: PlatformCredential,
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

/// Read-only source of per-team platform credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential_for(&self, team: &str) -> anyhow::Result<Option<PlatformCredential>>;
}

#[derive(Deserialize)]
struct CredentialEntry {
    team: String,
    #[serde(flatten)]
    credential: PlatformCredential,
}

/// Credentials loaded once from a JSON document at startup.
///
/// Document shape: `[{"team": "...", "clientId": "...", "clientSecret": "...",
/// "authUrl": "...", "apiUrl": "...", "resourceGroup": "..."}]`.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialStore {
    by_team: HashMap<String, PlatformCredential>,
}

impl StaticCredentialStore {
    pub fn from_json(document: &str) -> anyhow::Result<Self> {
        let entries: Vec<CredentialEntry> = serde_json::from_str(document)
            .map_err(|e| anyhow::anyhow!("invalid AI platform credentials document: {e}"))?;
        for entry in &entries {
            for (field, value) in [
                ("authUrl", &entry.credential.auth_url),
                ("apiUrl", &entry.credential.api_url),
            ] {
                url::Url::parse(value).map_err(|e| {
                    anyhow::anyhow!("team {}: {field} is not a valid URL: {e}", entry.team)
                })?;
            }
        }
        let mut by_team = HashMap::with_capacity(entries.len());
        for entry in entries {
            if by_team.contains_key(&entry.team) {
                anyhow::bail!("team {} has more than one credential entry", entry.team);
            }
            by_team.insert(entry.team, entry.credential);
        }
        Ok(Self { by_team })
    }

    pub fn len(&self) -> usize {
        self.by_team.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_team.is_empty()
    }
}

impl FromIterator<(String, PlatformCredential)> for StaticCredentialStore {
    fn from_iter<I: IntoIterator<Item = (String, PlatformCredential)>>(iter: I) -> Self {
        Self {
            by_team: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn credential_for(&self, team: &str) -> anyhow::Result<Option<PlatformCredential>> {
        Ok(self.by_team.get(team).cloned())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Maps an identity and a team onto the credential used to act as that team.
#[derive(Clone)]
pub struct CredentialResolver {
    directory: Arc<dyn Directory>,
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    pub fn new(directory: Arc<dyn Directory>, store: Arc<dyn CredentialStore>) -> Self {
        Self { directory, store }
    }

    /// Catalog record for the identity.
    pub async fn user(&self, identity: &str) -> Result<CatalogUser, AiCoreError> {
        self.directory
            .find_user(identity)
            .await?
            .ok_or_else(|| AiCoreError::UserNotFoundInDb(identity.to_owned()))
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn resolve(&self, identity: &str, team: &str) -> Result<TeamCredential, AiCoreError> {
        let user = self.user(identity).await?;
        self.resolve_for(&user, team).await
    }

    /// Resolve for an already-loaded user; the team must be one of the user's teams.
    pub async fn resolve_for(
        &self,
        user: &CatalogUser,
        team: &str,
    ) -> Result<TeamCredential, AiCoreError> {
        if !user.is_member_of(team) {
            return Err(AiCoreError::UserNotAssignedToTeam {
                user: user.name.clone(),
                team: Some(team.to_owned()),
            });
        }
        let credential = self
            .store
            .credential_for(team)
            .await?
            .ok_or_else(|| AiCoreError::CredentialsNotFound(team.to_owned()))?;
        Ok(TeamCredential {
            team: team.to_owned(),
            credential,
        })
    }

    /// Credential of the user's primary team.
    pub async fn resolve_primary(&self, identity: &str) -> Result<TeamCredential, AiCoreError> {
        let user = self.user(identity).await?;
        let team = user
            .primary_team()
            .ok_or_else(|| AiCoreError::UserNotAssignedToTeam {
                user: user.name.clone(),
                team: None,
            })?
            .to_owned();
        self.resolve_for(&user, &team).await
    }

    /// Explicit team when given, otherwise the primary team.
    pub async fn resolve_scoped(
        &self,
        identity: &str,
        team: Option<&str>,
    ) -> Result<TeamCredential, AiCoreError> {
        match team {
            Some(team) => self.resolve(identity, team).await,
            None => self.resolve_primary(identity).await,
        }
    }

    /// Every team of the user that has a credential on file, in membership order.
    pub async fn accessible_teams(
        &self,
        user: &CatalogUser,
    ) -> Result<Vec<TeamCredential>, AiCoreError> {
        let mut out = Vec::with_capacity(user.teams.len());
        for team in &user.teams {
            match self.resolve_for(user, team).await {
                Ok(cred) => out.push(cred),
                Err(e) if e.is_missing_credentials() => {
                    tracing::debug!(team = %team, "team has no AI platform credentials");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
