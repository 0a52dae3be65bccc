use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::aicore::types::Model;
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;
use crate::validation::check_identifier;

/// Scenario listed when the caller does not name one.
pub const DEFAULT_SCENARIO: &str = "foundation-models";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsParams {
    pub scenario_id: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelList {
    pub scenario_id: String,
    pub count: usize,
    pub models: Vec<Model>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ai-core/models", get(list_models))
}

#[tracing::instrument(skip(state, auth, params), fields(user = %auth.user_name), err)]
async fn list_models(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ModelsParams>,
) -> Result<Json<ModelList>, ApiError> {
    let scenario_id = params
        .scenario_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCENARIO)
        .to_owned();
    check_identifier("scenarioId", &scenario_id)?;
    let team = params.team.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if let Some(team) = team {
        check_identifier("team", team)?;
    }

    let core = &state.ai_core;
    let cred = core.resolver.resolve_scoped(auth.identity(), team).await?;
    let models = core.platform.list_models(&cred, &scenario_id).await?;
    Ok(Json(ModelList {
        scenario_id,
        count: models.len(),
        models,
    }))
}
