use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::helpers::ApiJson;
use crate::aicore::inference::{self, ChatRequestBody};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;
use crate::validation::check_identifier;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub fn router() -> Router<AppState> {
    Router::new().route("/ai-core/chat/inference", post(chat_inference))
}

/// Buffered JSON completion, or an event stream when `stream` is set.
///
/// Body parsing and validation failures are ordinary error responses. Once a stream is
/// committed the status is 200 and failures travel as `error` events.
#[tracing::instrument(skip(state, auth, body), fields(user = %auth.user_name), err)]
async fn chat_inference(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ChatRequestBody>,
) -> Result<Response, ApiError> {
    let call = body.validate()?;
    check_identifier("deploymentId", &call.request.deployment_id)?;
    if let Some(team) = &call.team {
        check_identifier("team", team)?;
    }

    if call.stream {
        let frames = inference::relay(state.ai_core.clone(), auth.user_name, call);
        return Ok(commit_event_stream(frames));
    }

    let response = inference::chat(&state.ai_core, auth.identity(), &call).await?;
    Ok(Json(response).into_response())
}

/// Fix the response head for an event stream; `frames` supplies the body.
fn commit_event_stream(frames: impl Stream<Item = Bytes> + Send + 'static) -> Response {
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        body,
    )
        .into_response()
}
