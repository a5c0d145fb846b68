//! API layer
//!
//! HTTP handlers for:
//! - User/session endpoints
//! - Video endpoints
//! - Metrics (Prometheus)

pub mod metrics;
mod response;
mod users;
mod videos;

pub use metrics::metrics_router;
pub use response::ApiResponse;
pub use users::users_router;
pub use videos::videos_router;

use axum::extract::multipart::Field;

use crate::error::AppError;
use crate::service::StagedFile;

/// Stage a multipart file field to a local temp file
///
/// Streams the field to disk with a size cap. The returned
/// [`StagedFile`] owns the temp file; dropping it removes the file on
/// every exit path.
pub(crate) async fn stage_field(
    field: &mut Field<'_>,
    max_bytes: usize,
) -> Result<StagedFile, AppError> {
    use tokio::io::AsyncWriteExt;

    let content_type = field
        .content_type()
        .map(ToString::to_string)
        .ok_or_else(|| {
            AppError::Validation("missing content type for uploaded file".to_string())
        })?;

    let temp = tempfile::NamedTempFile::new()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to create temp file: {}", e)))?;
    let std_handle = temp
        .reopen()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to reopen temp file: {}", e)))?;
    let mut file = tokio::fs::File::from_std(std_handle);

    let mut written = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("failed to read uploaded file: {}", e)))?
    {
        written += chunk.len();
        if written > max_bytes {
            return Err(AppError::Validation(format!(
                "file too large: exceeds {} bytes",
                max_bytes
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to stage upload: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to stage upload: {}", e)))?;

    if written == 0 {
        return Err(AppError::Validation("uploaded file was empty".to_string()));
    }

    Ok(StagedFile {
        file: temp,
        content_type,
    })
}
