//! Multipart form reading

use axum::extract::multipart::{Multipart, MultipartRejection};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::services::UploadedFile;

/// Form field carrying the uploaded spreadsheet
pub const FILE_FIELD: &str = "file";

/// Read the `file` field, ignoring any other fields
///
/// Returns `None` when the form has no such field.
pub async fn read_file(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Option<UploadedFile>> {
    let mut multipart = multipart.map_err(|e| ApiError::Validation(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {}", e)))?;
        debug!(file_name = %file_name, bytes = data.len(), "Received file");
        return Ok(Some(UploadedFile {
            file_name,
            data: data.to_vec(),
        }));
    }
    Ok(None)
}

/// Read the `file` field, failing when it is absent
pub async fn require_file(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<UploadedFile> {
    read_file(multipart)
        .await?
        .ok_or_else(|| ApiError::Validation("Missing file".to_string()))
}
