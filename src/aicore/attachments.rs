use uuid::Uuid;

use super::AiCore;
use super::error::AiCoreError;
use super::types::{Attachment, UploadResponse, UploadedFile};

/// Reject empty batches and batches whose combined size is over `limit`.
pub fn check_batch(files: &[Attachment], limit: usize) -> Result<(), AiCoreError> {
    if files.is_empty() {
        return Err(AiCoreError::NoFilesProvided);
    }
    let actual: usize = files.iter().map(Attachment::size).sum();
    if actual > limit {
        return Err(AiCoreError::CombinedFileSizeExceeded { actual, limit });
    }
    Ok(())
}

/// Forward a batch of files to the platform's dataset storage, one after another.
///
/// Each file lands under its own `uploads/<file-id>/<filename>` in the team's storage, so
/// repeated names never overwrite each other. The first failing file fails the batch. Files
/// already forwarded stay stored upstream; the caller receives no partial result.
#[tracing::instrument(skip(core, files), fields(files = files.len()), err)]
pub async fn upload(
    core: &AiCore,
    identity: &str,
    team: Option<&str>,
    files: Vec<Attachment>,
) -> Result<UploadResponse, AiCoreError> {
    check_batch(&files, core.settings.upload_max_bytes)?;
    let cred = core.resolver.resolve_scoped(identity, team).await?;

    let mut uploaded = Vec::with_capacity(files.len());
    for file in &files {
        let path = format!("uploads/{}/{}", Uuid::new_v4(), file.filename);
        let stored = core.platform.upload_file(&cred, &path, file).await?;
        uploaded.push(UploadedFile {
            filename: file.filename.clone(),
            size: file.size(),
            url: stored.url,
            message: stored.message,
        });
    }
    tracing::info!(team = %cred.team, count = uploaded.len(), "attachments uploaded");
    Ok(UploadResponse {
        count: uploaded.len(),
        files: uploaded,
    })
}
