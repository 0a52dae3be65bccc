pub mod attachments;
pub mod configurations;
pub mod deployments;
pub mod helpers;
pub mod identity;
pub mod inference;
pub mod models;

use axum::Router;

use crate::store::AppState;

pub fn router(upload_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(deployments::router())
        .merge(configurations::router())
        .merge(models::router())
        .merge(identity::router())
        .merge(inference::router())
        .merge(attachments::router(upload_max_bytes))
}

/// Full application: health check, AI platform routes, and the identity middleware.
pub fn app(state: AppState) -> Router {
    let upload_max_bytes = state.ai_core.settings.upload_max_bytes;
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(router(upload_max_bytes))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::middleware::proxy_claims,
        ))
        .with_state(state)
}
