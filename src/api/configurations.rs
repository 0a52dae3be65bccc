use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::helpers::{ApiJson, TeamScope, audit};
use crate::aicore::configurations;
use crate::aicore::types::{Configuration, ConfigurationRequest};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ConfigurationList {
    pub count: usize,
    pub configurations: Vec<Configuration>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/ai-core/configurations",
        get(list_configurations).post(create_configuration),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, auth, scope), fields(user = %auth.user_name), err)]
async fn list_configurations(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(scope): Query<TeamScope>,
) -> Result<Json<ConfigurationList>, ApiError> {
    let configurations =
        configurations::list(&state.ai_core, auth.identity(), scope.team()?).await?;
    Ok(Json(ConfigurationList {
        count: configurations.len(),
        configurations,
    }))
}

#[tracing::instrument(skip(state, auth, scope, body), fields(user = %auth.user_name), err)]
async fn create_configuration(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(scope): Query<TeamScope>,
    ApiJson(body): ApiJson<ConfigurationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let team = scope.team()?;
    let configuration =
        configurations::create(&state.ai_core, auth.identity(), team, body).await?;

    audit(
        &auth,
        "configuration.create",
        "configuration",
        Some(&configuration.id),
        team,
        Some(serde_json::json!({
            "name": configuration.name,
            "executableId": configuration.executable_id,
            "scenarioId": configuration.scenario_id,
        })),
    );

    Ok((StatusCode::CREATED, Json(configuration)))
}
