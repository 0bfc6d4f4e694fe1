//! HTTP error responses.

use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use stowage_core::storage::StorageError;
use stowage_shared::AppError;
use tracing::{error, warn};
use uuid::Uuid;

/// Error returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Failure from the application layers.
    App(AppError),
    /// The request body is not a readable multipart form.
    Multipart {
        /// Status chosen by the extractor (400, 413, ...).
        status: StatusCode,
        /// Extractor detail; safe to show.
        message: String,
    },
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::App(err.into())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Multipart {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::App(err) => app_error_response(&err),
            Self::Multipart { status, message } => {
                warn!(%status, %message, "rejected multipart body");
                (
                    status,
                    Json(json!({
                        "error": "INVALID_MULTIPART",
                        "message": message
                    })),
                )
                    .into_response()
            }
        }
    }
}

fn app_error_response(err: &AppError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if err.is_client_safe() {
        return (
            status,
            Json(json!({
                "error": err.error_code(),
                "message": err.to_string()
            })),
        )
            .into_response();
    }

    // Backend detail stays in the log; the caller gets an id to quote.
    let correlation_id = Uuid::new_v4();
    error!(%correlation_id, code = err.error_code(), error = %err, "request failed");
    (
        status,
        Json(json!({
            "error": err.error_code(),
            "message": public_message(err),
            "correlationId": correlation_id
        })),
    )
        .into_response()
}

fn public_message(err: &AppError) -> &'static str {
    match err {
        AppError::BucketUnavailable(_) => "Storage bucket is unavailable",
        AppError::BackendUnreachable(_) => "Storage backend is unreachable",
        AppError::Cancelled(_) => "Request was cancelled before it completed",
        _ => "An error occurred",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_validation_message_is_verbatim() {
        let err = StorageError::invalid_input("file is required");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
        assert!(
            body["message"]
                .as_str()
                .is_some_and(|m| m.contains("file is required"))
        );
        assert!(body.get("correlationId").is_none());
    }

    #[tokio::test]
    async fn test_backend_detail_is_hidden() {
        let err = AppError::BackendUnreachable("dial tcp 10.0.0.7:9000: refused".to_string());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "BACKEND_UNREACHABLE");
        assert_eq!(body["message"], "Storage backend is unreachable");
        assert!(body["correlationId"].is_string());
        assert!(!body.to_string().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_status_per_class() {
        for (err, status) in [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::BucketUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Cancelled("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_multipart_rejection_is_json() {
        let err = ApiError::Multipart {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = body_json(response).await;
        assert_eq!(body["error"], "INVALID_MULTIPART");
        assert_eq!(body["message"], "length limit exceeded");
    }
}
