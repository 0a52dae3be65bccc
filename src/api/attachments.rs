use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::routing::post;
use axum::{Json, Router};

use super::helpers::{TeamScope, audit};
use crate::aicore::attachments;
use crate::aicore::error::AiCoreError;
use crate::aicore::types::{Attachment, UploadResponse};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::store::AppState;
use crate::validation::sanitize_filename;

const FILE_FIELDS: [&str; 2] = ["file", "files"];

/// Transport ceiling for the upload route. Kept well above the combined-size limit so that
/// oversized batches reach the size check and get a descriptive 400 instead of a bare 413.
pub fn body_limit(upload_max_bytes: usize) -> usize {
    upload_max_bytes.saturating_mul(4).max(1024 * 1024)
}

pub fn router(upload_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/ai-core/upload", post(upload))
        .layer(DefaultBodyLimit::max(body_limit(upload_max_bytes)))
}

#[tracing::instrument(skip(state, auth, scope, multipart), fields(user = %auth.user_name), err)]
async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(scope): Query<TeamScope>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let team = scope.team()?;
    let limit = state.ai_core.settings.upload_max_bytes;

    let mut files = Vec::new();
    let mut total = 0_usize;
    while let Some(field) = multipart.next_field().await? {
        if !field.name().is_some_and(|n| FILE_FIELDS.contains(&n)) {
            continue;
        }
        let Some(raw_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let filename = sanitize_filename(&raw_name)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid filename: {raw_name}")))?;
        let content_type = field.content_type().map(str::to_owned);
        let content = field.bytes().await?;
        total += content.len();
        // Stop reading as soon as the batch can no longer fit.
        if total > limit {
            return Err(AiCoreError::CombinedFileSizeExceeded {
                actual: total,
                limit,
            }
            .into());
        }
        files.push(Attachment {
            filename,
            content_type,
            content,
        });
    }

    let names: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
    let response = attachments::upload(&state.ai_core, auth.identity(), team, files).await?;

    audit(
        &auth,
        "attachment.upload",
        "file",
        None,
        team,
        Some(serde_json::json!({ "files": names, "bytes": total })),
    );

    Ok(Json(response))
}
