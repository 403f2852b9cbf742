//! Video upload handler.

use std::path::Path as FsPath;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use vsent_models::{sanitize_filename, JobId, SourceRef};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub job_id: JobId,
}

/// POST /api/upload
///
/// Streams the `video` part to `{upload_dir}/{uuid}/{filename}` and submits
/// an analysis job for it.
///
/// Returns:
/// - 200: Upload stored and job accepted
/// - 400: Missing `video` part or empty filename
/// - 503: Too many pending jobs or shutting down
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let client_name = field.file_name().unwrap_or_default().trim().to_string();
        if client_name.is_empty() {
            return Err(ApiError::bad_request("No file selected"));
        }

        let upload_dir = state.config.upload_dir.join(Uuid::new_v4().to_string());
        let path = upload_dir.join(sanitize_filename(&client_name));

        let written = match store_field(field, &upload_dir, &path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_upload(&upload_dir).await;
                return Err(e);
            }
        };
        metrics::record_upload_bytes(written);
        info!(path = %path.display(), bytes = written, "Stored upload");

        // No job will ever read a file whose submission was refused
        let job_id = match state.service.submit(SourceRef::new(path.to_string_lossy())) {
            Ok(job_id) => job_id,
            Err(e) => {
                discard_upload(&upload_dir).await;
                return Err(e.into());
            }
        };

        return Ok(Json(UploadResponse {
            message: "Video uploaded successfully".to_string(),
            job_id,
        }));
    }

    Err(ApiError::bad_request("No video file part"))
}

async fn discard_upload(dir: &FsPath) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!(path = %dir.display(), "Failed to remove upload: {}", e);
    }
}

/// Write the field chunk by chunk and return the number of bytes stored.
async fn store_field(mut field: Field<'_>, dir: &FsPath, path: &FsPath) -> ApiResult<u64> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create upload directory: {}", e)))?;

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create upload file: {}", e)))?;

    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {}", e)))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;

    Ok(written)
}
