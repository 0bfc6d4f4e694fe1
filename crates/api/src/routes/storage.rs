//! Object upload and download endpoints.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, Query, State, multipart::MultipartRejection},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use stowage_core::storage::ObjectPayload;
use stowage_core::transfer::UploadResult;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{AppState, error::ApiError};

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// Creates the storage routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/storage/upload", post(upload))
        .route("/storage/download", get(download))
}

/// Query parameters for upload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    /// Target bucket; the configured default when absent.
    pub bucket: Option<String>,
    /// Object name; the multipart filename or a generated id when absent.
    pub object_name: Option<String>,
}

/// Query parameters for download.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadParams {
    /// Source bucket; the configured default when absent.
    pub bucket: Option<String>,
    /// Object to fetch. Required.
    pub object_name: Option<String>,
}

/// A file part read from the request.
struct FilePart {
    content: Bytes,
    file_name: Option<String>,
    content_type: Option<String>,
}

/// POST `/storage/upload`
/// Store the multipart `file` field and report where it went.
async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResult>, ApiError> {
    // Cancels the backend call if the client goes away mid-request.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let part = read_file_part(multipart?).await?;
    let object_name = params
        .object_name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| part.as_ref().and_then(|p| p.file_name.clone()));
    let payload = part.map(|p| {
        ObjectPayload::from_bytes(p.content).with_content_type(p.content_type.as_deref())
    });

    let result = state
        .transfer
        .upload(
            payload,
            params.bucket.as_deref(),
            object_name.as_deref(),
            &cancel,
        )
        .await?;

    info!(bucket = %result.bucket, object_name = %result.object_name, "object uploaded");
    Ok(Json(result))
}

/// GET `/storage/download?objectName=..&bucket=..`
/// Stream an object back as an attachment.
async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let stream = state
        .transfer
        .download(
            params.bucket.as_deref(),
            params.object_name.as_deref(),
            &cancel,
        )
        .await?;

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(params.object_name.as_deref().unwrap_or_default()),
    );
    Ok(response)
}

/// Read the `file` field, falling back to the first field that carries a
/// filename.
async fn read_file_part(mut multipart: Multipart) -> Result<Option<FilePart>, ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart.next_field().await? {
        let is_file_field = field.name() == Some(FILE_FIELD);
        if !is_file_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let part = FilePart {
            content: field.bytes().await?,
            file_name,
            content_type,
        };

        if is_file_field {
            return Ok(Some(part));
        }
        fallback = Some(part);
    }

    Ok(fallback)
}

fn content_disposition(object_name: &str) -> HeaderValue {
    let escaped = object_name.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_bytes(format!("attachment; filename=\"{escaped}\"").as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
