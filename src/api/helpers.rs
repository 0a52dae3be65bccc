use axum::extract::FromRequest;
use serde::Deserialize;

use crate::audit::{AuditEntry, write_audit};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::validation::check_identifier;

/// JSON body extractor whose rejections use the API error shape (always 400).
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Optional `?team=` selector shared by the AI platform routes.
#[derive(Debug, Default, Deserialize)]
pub struct TeamScope {
    pub team: Option<String>,
}

impl TeamScope {
    /// The selected team, validated; blank means "not selected".
    pub fn team(&self) -> Result<Option<&str>, ApiError> {
        match self.team.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(team) => {
                check_identifier("team", team)?;
                Ok(Some(team))
            }
        }
    }
}

/// Record a mutating AI platform call made on behalf of `auth`.
pub fn audit(
    auth: &AuthUser,
    action: &str,
    resource: &str,
    resource_id: Option<&str>,
    team: Option<&str>,
    detail: Option<serde_json::Value>,
) {
    write_audit(&audit_entry(auth, action, resource, resource_id, team, detail));
}

fn audit_entry<'a>(
    auth: &'a AuthUser,
    action: &'a str,
    resource: &'a str,
    resource_id: Option<&'a str>,
    team: Option<&'a str>,
    detail: Option<serde_json::Value>,
) -> AuditEntry<'a> {
    AuditEntry {
        actor: &auth.user_name,
        actor_email: auth.email.as_deref(),
        action,
        resource,
        resource_id,
        team,
        detail,
        ip_addr: auth.ip_addr.as_deref(),
    }
}
