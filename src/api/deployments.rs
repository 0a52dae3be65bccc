use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::helpers::{ApiJson, TeamScope, audit};
use crate::aicore::aggregator;
use crate::aicore::deployments::{self, CreateDeploymentRequest, ModifyDeploymentRequest};
use crate::aicore::types::{AggregatedDeployments, Deployment};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;
use crate::validation::check_identifier;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/ai-core/deployments",
            get(list_deployments).post(create_deployment),
        )
        .route(
            "/ai-core/deployments/{id}",
            get(get_deployment)
                .patch(modify_deployment)
                .delete(delete_deployment),
        )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, auth), fields(user = %auth.user_name), err)]
async fn list_deployments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<AggregatedDeployments>, ApiError> {
    let result = aggregator::list_deployments(&state.ai_core, auth.identity()).await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(state, auth, scope), fields(user = %auth.user_name, %id), err)]
async fn get_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(scope): Query<TeamScope>,
) -> Result<Json<Deployment>, ApiError> {
    check_identifier("id", &id)?;
    let deployment =
        deployments::get(&state.ai_core, auth.identity(), scope.team()?, &id).await?;
    Ok(Json(deployment))
}

#[tracing::instrument(skip(state, auth, scope, body), fields(user = %auth.user_name), err)]
async fn create_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(scope): Query<TeamScope>,
    ApiJson(body): ApiJson<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let team = scope.team()?;
    let plan = body.into_plan()?;
    let inline = matches!(plan.source, deployments::ConfigurationSource::Inline(_));
    if let deployments::ConfigurationSource::ById(id) = &plan.source {
        check_identifier("configurationId", id)?;
    }

    let created = deployments::create(&state.ai_core, auth.identity(), team, plan).await?;

    audit(
        &auth,
        "deployment.create",
        "deployment",
        Some(&created.id),
        team,
        Some(serde_json::json!({ "inlineConfiguration": inline, "ttl": created.ttl })),
    );

    Ok((StatusCode::ACCEPTED, Json(created)))
}

#[tracing::instrument(skip(state, auth, scope, body), fields(user = %auth.user_name, %id), err)]
async fn modify_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(scope): Query<TeamScope>,
    ApiJson(body): ApiJson<ModifyDeploymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_identifier("id", &id)?;
    let team = scope.team()?;
    let change = body.into_change()?;
    if let Some(configuration_id) = change.configuration_id() {
        check_identifier("configurationId", configuration_id)?;
    }
    let detail = change.to_body();

    let modified =
        deployments::modify(&state.ai_core, auth.identity(), team, &id, change).await?;

    audit(&auth, "deployment.modify", "deployment", Some(&id), team, Some(detail));

    Ok((StatusCode::ACCEPTED, Json(modified)))
}

#[tracing::instrument(skip(state, auth, scope), fields(user = %auth.user_name, %id), err)]
async fn delete_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(scope): Query<TeamScope>,
) -> Result<impl IntoResponse, ApiError> {
    check_identifier("id", &id)?;
    let team = scope.team()?;
    let deleted = deployments::delete(&state.ai_core, auth.identity(), team, &id).await?;

    audit(&auth, "deployment.delete", "deployment", Some(&id), team, None);

    Ok((StatusCode::ACCEPTED, Json(deleted)))
}
