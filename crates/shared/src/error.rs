//! Application-wide error types.

use thiserror::Error;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Caller supplied an invalid or missing value.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bucket exists but cannot be used (permissions, configuration).
    #[error("Bucket unavailable: {0}")]
    BucketUnavailable(String),

    /// Backend could not be reached.
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Request was cancelled or ran past its deadline.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::BackendUnreachable(_) => 502,
            Self::BucketUnavailable(_) => 503,
            Self::Cancelled(_) => 504,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BucketUnavailable(_) => "BUCKET_UNAVAILABLE",
            Self::BackendUnreachable(_) => "BACKEND_UNREACHABLE",
            Self::Cancelled(_) => "CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the message may be shown to the caller as-is.
    ///
    /// Backend-class errors carry store internals and are replaced by a
    /// generic message plus a correlation id at the HTTP edge.
    #[must_use]
    pub const fn is_client_safe(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}
