use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::{RawFile, UNKNOWN_FILE};
use crate::service::session::Session;
use crate::service::upload::{BatchResult, UploadProgress, MAX_FILE_BYTES};

const FILE_FIELD: &str = "file";

#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub result: BatchResult,
    /// Combined "Upload errors: ..." line, present when any file failed.
    pub error: Option<String>,
}

/// POST `/api/files/upload`: every `file` part becomes one upload task.
pub async fn upload_handler(
    State(session): State<Session>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    if session.current_user().await.is_none() {
        return Err(AppError::NotSignedIn);
    }

    let files = read_files(&mut multipart).await?;
    if files.is_empty() {
        return Err(AppError::InvalidUpload { message: "no file parts in request".to_string() });
    }

    let result = session.upload(files).await?;
    Ok(Json(UploadResponse { error: result.summary_error(), result }))
}

/// GET `/api/uploads/progress`
pub async fn progress_handler(State(session): State<Session>) -> Json<UploadProgress> {
    Json(session.upload_progress())
}

/// Collects the `file` parts. A part larger than the per-file limit is still
/// read to the end so its size is known, but its body is not kept; validation
/// rejects it later by size.
async fn read_files(multipart: &mut Multipart) -> Result<Vec<RawFile>, AppError> {
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(invalid_upload)? {
        if field.name() != Some(FILE_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }
        let name = field.file_name().unwrap_or(UNKNOWN_FILE).to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut size: u64 = 0;
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(invalid_upload)? {
            size += chunk.len() as u64;
            if size <= MAX_FILE_BYTES {
                bytes.extend_from_slice(&chunk);
            } else if !bytes.is_empty() {
                bytes = Vec::new();
            }
        }
        if size > MAX_FILE_BYTES {
            warn!("'{name}' is {size} bytes; body discarded");
        }

        files.push(RawFile { size, ..RawFile::new(name, content_type, bytes) });
    }

    Ok(files)
}

fn invalid_upload(e: MultipartError) -> AppError {
    AppError::InvalidUpload { message: e.body_text() }
}
