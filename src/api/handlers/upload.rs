use crate::AppState;
use crate::api::error::AppError;
use crate::services::blob_store::validate_blob_name;
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

const FILE_FIELD: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const NO_FILE: &str = "No file provided";

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "Multipart form with a `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File uploaded", body = UploadResponse),
        (status = 400, description = "No file provided, or the filename is not a valid blob name"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Blob storage call failed")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    // Not a multipart/form-data request at all
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Rejected upload body: {}", rejection.body_text());
        AppError::BadRequest(NO_FILE.to_string())
    })?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A `file` part without a filename is a plain form value, not a file
        let Some(filename) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string)
        else {
            continue;
        };
        validate_blob_name(&filename)?;

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = field.bytes().await.map_err(multipart_error)?;
        let size = data.len();

        state
            .blobs
            .upload_blob(&filename, data, &content_type)
            .await?;

        info!("📦 Uploaded '{}' ({} bytes, {})", filename, size, content_type);

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                message: format!("File {} uploaded", filename),
            }),
        ));
    }

    Err(AppError::BadRequest(NO_FILE.to_string()))
}
