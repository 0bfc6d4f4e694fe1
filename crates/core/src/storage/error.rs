//! Storage error types.

use stowage_shared::AppError;
use thiserror::Error;

use super::location::StorageLocation;

/// Storage operation errors.
///
/// Every backend failure carries the bucket and object it was operating on.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Caller supplied an invalid or missing value.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong.
        message: String,
        /// Bucket involved, when known.
        bucket: Option<String>,
        /// Object involved, when known.
        object: Option<String>,
    },

    /// Bucket exists but cannot be used (permission or ownership problem).
    #[error("bucket '{bucket}' is unavailable: {message}")]
    BucketUnavailable {
        /// Bucket name.
        bucket: String,
        /// Object being accessed.
        object: String,
        /// Backend detail.
        message: String,
    },

    /// Backend could not be reached (connection refused, timeout, DNS).
    #[error("backend unreachable while accessing {bucket}/{object}: {message}")]
    BackendUnreachable {
        /// Bucket name.
        bucket: String,
        /// Object name.
        object: String,
        /// Transport detail.
        message: String,
    },

    /// Object does not exist.
    #[error("object not found: {bucket}/{object}")]
    ObjectNotFound {
        /// Bucket name.
        bucket: String,
        /// Object name.
        object: String,
    },

    /// Caller withdrew the request or its deadline passed.
    #[error("operation cancelled: {bucket}/{object}")]
    Cancelled {
        /// Bucket name.
        bucket: String,
        /// Object name.
        object: String,
    },

    /// Anything the backend reported that fits no other class.
    #[error("storage operation failed on {bucket}/{object}: {message}")]
    Unknown {
        /// Bucket name.
        bucket: String,
        /// Object name.
        object: String,
        /// Backend detail.
        message: String,
    },
}

/// Discriminant of [`StorageError`], handy for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// See [`StorageError::InvalidInput`].
    InvalidInput,
    /// See [`StorageError::BucketUnavailable`].
    BucketUnavailable,
    /// See [`StorageError::BackendUnreachable`].
    BackendUnreachable,
    /// See [`StorageError::ObjectNotFound`].
    ObjectNotFound,
    /// See [`StorageError::Cancelled`].
    Cancelled,
    /// See [`StorageError::Unknown`].
    Unknown,
}

impl StorageError {
    /// Create an invalid input error with no location.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            bucket: None,
            object: None,
        }
    }

    /// Create an invalid input error for a bucket name.
    #[must_use]
    pub fn invalid_bucket(bucket: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            bucket: Some(bucket.into()),
            object: None,
        }
    }

    /// Create an invalid input error for a resolved location.
    #[must_use]
    pub fn invalid_payload(location: &StorageLocation, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            bucket: Some(location.bucket().to_string()),
            object: Some(location.object_name().to_string()),
        }
    }

    /// Create a bucket unavailable error.
    #[must_use]
    pub fn bucket_unavailable(location: &StorageLocation, message: impl Into<String>) -> Self {
        Self::BucketUnavailable {
            bucket: location.bucket().to_string(),
            object: location.object_name().to_string(),
            message: message.into(),
        }
    }

    /// Create a backend unreachable error.
    #[must_use]
    pub fn backend_unreachable(location: &StorageLocation, message: impl Into<String>) -> Self {
        Self::BackendUnreachable {
            bucket: location.bucket().to_string(),
            object: location.object_name().to_string(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(location: &StorageLocation) -> Self {
        Self::ObjectNotFound {
            bucket: location.bucket().to_string(),
            object: location.object_name().to_string(),
        }
    }

    /// Create a cancelled error.
    #[must_use]
    pub fn cancelled(location: &StorageLocation) -> Self {
        Self::Cancelled {
            bucket: location.bucket().to_string(),
            object: location.object_name().to_string(),
        }
    }

    /// Create an unclassified backend error.
    #[must_use]
    pub fn unknown(location: &StorageLocation, message: impl Into<String>) -> Self {
        Self::Unknown {
            bucket: location.bucket().to_string(),
            object: location.object_name().to_string(),
            message: message.into(),
        }
    }

    /// Error class.
    #[must_use]
    pub const fn kind(&self) -> StorageErrorKind {
        match self {
            Self::InvalidInput { .. } => StorageErrorKind::InvalidInput,
            Self::BucketUnavailable { .. } => StorageErrorKind::BucketUnavailable,
            Self::BackendUnreachable { .. } => StorageErrorKind::BackendUnreachable,
            Self::ObjectNotFound { .. } => StorageErrorKind::ObjectNotFound,
            Self::Cancelled { .. } => StorageErrorKind::Cancelled,
            Self::Unknown { .. } => StorageErrorKind::Unknown,
        }
    }

    /// Whether an outer policy may retry the operation with backoff.
    ///
    /// Only transient transport failures qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnreachable { .. })
    }
}

/// Map an OpenDAL error onto the storage taxonomy.
pub(crate) fn from_opendal(err: &opendal::Error, location: &StorageLocation) -> StorageError {
    match err.kind() {
        opendal::ErrorKind::NotFound => StorageError::not_found(location),
        opendal::ErrorKind::PermissionDenied => {
            StorageError::bucket_unavailable(location, err.to_string())
        }
        _ if err.is_temporary() => StorageError::backend_unreachable(location, err.to_string()),
        _ => StorageError::unknown(location, err.to_string()),
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err.kind() {
            StorageErrorKind::InvalidInput => Self::Validation(message),
            StorageErrorKind::ObjectNotFound => Self::NotFound(message),
            StorageErrorKind::BucketUnavailable => Self::BucketUnavailable(message),
            StorageErrorKind::BackendUnreachable => Self::BackendUnreachable(message),
            StorageErrorKind::Cancelled => Self::Cancelled(message),
            StorageErrorKind::Unknown => Self::Internal(message),
        }
    }
}

/// Errors raised while building a gateway from configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration cannot produce a working backend.
    #[error("storage configuration error: {0}")]
    Invalid(String),
}
