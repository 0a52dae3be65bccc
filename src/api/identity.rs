use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: String,
    /// Teams of the caller that can reach the AI platform.
    pub ai_instances: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ai-core/me", get(me))
}

#[tracing::instrument(skip(state, auth), fields(user = %auth.user_name), err)]
async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<MeResponse>, ApiError> {
    let resolver = &state.ai_core.resolver;
    let user = resolver.user(auth.identity()).await?;
    let ai_instances = resolver
        .accessible_teams(&user)
        .await?
        .into_iter()
        .map(|cred| cred.team)
        .collect();
    Ok(Json(MeResponse {
        user: user.name,
        ai_instances,
    }))
}
