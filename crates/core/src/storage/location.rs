//! Bucket/object addressing and the key resolver.

use std::fmt;

use stowage_shared::GatewayConfig;
use uuid::Uuid;

use super::error::StorageError;

/// Shortest legal bucket name.
pub const MIN_BUCKET_LEN: usize = 3;
/// Longest legal bucket name.
pub const MAX_BUCKET_LEN: usize = 63;
/// Longest object name in bytes.
pub const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Resolved (bucket, object) pair for one request.
///
/// Only constructible through validation, so both parts are always
/// non-empty and the bucket name is legal for every backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    bucket: String,
    object_name: String,
}

impl StorageLocation {
    /// Validate and build a location.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if either part breaks the naming rules.
    pub fn new(
        bucket: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let bucket = bucket.into();
        let object_name = object_name.into();
        validate_bucket_name(&bucket)?;
        validate_object_name(&bucket, &object_name)?;
        Ok(Self {
            bucket,
            object_name,
        })
    }

    /// Bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object name within the bucket.
    #[must_use]
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Backend path: `{bucket}/{object_name}`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.bucket, self.object_name)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object_name)
    }
}

/// Check a bucket name against common object-store rules.
///
/// Lowercase ASCII letters, digits and `-`; 3 to 63 characters; starts and
/// ends with a letter or digit.
///
/// # Errors
///
/// Returns `InvalidInput` naming the offending bucket.
pub fn validate_bucket_name(bucket: &str) -> Result<(), StorageError> {
    if !(MIN_BUCKET_LEN..=MAX_BUCKET_LEN).contains(&bucket.len()) {
        return Err(StorageError::invalid_bucket(
            bucket,
            format!(
                "bucket name must be {MIN_BUCKET_LEN}-{MAX_BUCKET_LEN} characters, got {}",
                bucket.len()
            ),
        ));
    }

    if let Some(c) = bucket
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(StorageError::invalid_bucket(
            bucket,
            format!("bucket name contains illegal character '{c}'"),
        ));
    }

    if bucket.starts_with('-') || bucket.ends_with('-') {
        return Err(StorageError::invalid_bucket(
            bucket,
            "bucket name must start and end with a letter or digit",
        ));
    }

    Ok(())
}

/// Object names must be non-blank, bounded, free of control characters and
/// must not step outside the bucket (`.`/`..` segments, leading or trailing
/// `/`).
fn validate_object_name(bucket: &str, object_name: &str) -> Result<(), StorageError> {
    let reject = |message: &str| StorageError::InvalidInput {
        message: message.to_string(),
        bucket: Some(bucket.to_string()),
        object: Some(object_name.to_string()),
    };

    if object_name.trim().is_empty() {
        return Err(reject("object name must not be blank"));
    }
    if object_name.len() > MAX_OBJECT_NAME_LEN {
        return Err(reject("object name exceeds 1024 bytes"));
    }
    if object_name.chars().any(char::is_control) {
        return Err(reject("object name contains control characters"));
    }
    if object_name.starts_with('/') || object_name.ends_with('/') {
        return Err(reject("object name must not start or end with '/'"));
    }
    if object_name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(reject("object name contains an empty, '.' or '..' segment"));
    }

    Ok(())
}

/// Derives the effective location of a request.
///
/// Pure function of its inputs and the configured default bucket.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    default_bucket: String,
}

impl KeyResolver {
    /// Create a resolver with the given default bucket.
    #[must_use]
    pub fn new(default_bucket: impl Into<String>) -> Self {
        Self {
            default_bucket: default_bucket.into(),
        }
    }

    /// Create a resolver from gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.default_bucket.clone())
    }

    /// Bucket used when a request names none.
    #[must_use]
    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// Resolve the requested bucket and object name.
    ///
    /// A blank or absent bucket becomes the default bucket. A blank or absent
    /// name becomes a fresh UUID v4 so unrelated uploads never overwrite each
    /// other.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the resulting bucket or name is illegal.
    pub fn resolve(
        &self,
        requested_bucket: Option<&str>,
        requested_name: Option<&str>,
    ) -> Result<StorageLocation, StorageError> {
        let bucket = non_blank(requested_bucket).unwrap_or(&self.default_bucket);
        let object_name = non_blank(requested_name)
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        StorageLocation::new(bucket, object_name)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
