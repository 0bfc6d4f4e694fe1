//! S3-compatible gateway (MinIO, AWS S3, Cloudflare R2, ...).
//!
//! ```text
//! put: HEAD bucket ─► CREATE bucket (on 404) ─► PUT object
//! get: GET object  ─► body streamed to the caller
//! ```
//!
//! The SDK's own retry loop is disabled so every failure surfaces after a
//! single attempt; retry policy belongs to callers.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use futures::{StreamExt, TryStreamExt};
use http_body::Frame;
use http_body_util::StreamBody;
use stowage_shared::GatewayConfig;
use sync_wrapper::SyncStream;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{StorageError, StorageErrorKind};
use super::gateway::{StorageGateway, cancellable};
use super::location::StorageLocation;
use super::payload::{ObjectPayload, ObjectStream, read_to_end};

/// Region whose bucket creation must not carry a location constraint.
const LEGACY_REGION: &str = "us-east-1";

/// Connect timeout for the shared HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway speaking the S3 wire protocol.
///
/// Wraps one SDK client; the client's connection pool is shared by every
/// request and safe for concurrent use.
#[derive(Debug, Clone)]
pub struct S3Gateway {
    client: Client,
    region: String,
}

impl S3Gateway {
    /// Build a client from gateway configuration.
    ///
    /// Uses path-style addressing, which MinIO and most S3-compatible stores
    /// require.
    pub async fn connect(config: &GatewayConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "stowage-config",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(CONNECT_TIMEOUT)
                    .build(),
            )
            .load()
            .await;

        // S3-compatible stores differ in aws-chunked support, so checksums
        // are only sent where an operation requires them.
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        info!(endpoint = %config.endpoint_url(), region = %config.region, "S3 client configured");

        Self::from_client(Client::from_conf(s3_config), config.region.clone())
    }

    /// Wrap an existing SDK client.
    #[must_use]
    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    async fn head_bucket(&self, location: &StorageLocation) -> Result<(), StorageError> {
        match self.client.head_bucket().bucket(location.bucket()).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(HeadBucketError::is_not_found) => {
                Err(StorageError::not_found(location))
            }
            Err(e) => Err(map_sdk_error(&e, location)),
        }
    }

    async fn create_bucket(&self, location: &StorageLocation) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(location.bucket());
        if self.region != LEGACY_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket = location.bucket(), "bucket created");
                Ok(())
            }
            // Another writer created it between our HEAD and CREATE. A bucket
            // owned by someone else fails later at PutObject with 403.
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                debug!(bucket = location.bucket(), "bucket already exists");
                Ok(())
            }
            Err(e) => Err(map_sdk_error(&e, location)),
        }
    }

    async fn ensure_bucket(&self, location: &StorageLocation) -> Result<(), StorageError> {
        match self.head_bucket(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == StorageErrorKind::ObjectNotFound => {
                self.create_bucket(location).await
            }
            Err(e) => Err(e),
        }
    }

    /// `PutObject` needs an exact length up front. A payload with a known
    /// size streams straight through; one without is collected first, so
    /// memory use then scales with object size.
    async fn write(
        &self,
        location: &StorageLocation,
        payload: ObjectPayload,
    ) -> Result<(), StorageError> {
        self.ensure_bucket(location).await?;

        let (content, size_hint, content_type) = payload.into_parts();
        let (body, length) = match size_hint {
            Some(size) => {
                let length = i64::try_from(size)
                    .map_err(|_| StorageError::invalid_payload(location, "payload too large"))?;
                (streaming_body(content), length)
            }
            None => {
                let buffered = read_to_end(content)
                    .await
                    .map_err(|e| StorageError::invalid_payload(location, e.to_string()))?;
                let length = i64::try_from(buffered.len())
                    .map_err(|_| StorageError::invalid_payload(location, "payload too large"))?;
                (ByteStream::from(buffered), length)
            }
        };

        self.client
            .put_object()
            .bucket(location.bucket())
            .key(location.object_name())
            .content_type(content_type)
            .content_length(length)
            .body(body)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, location))?;

        debug!(location = %location, bytes = length, "object stored");
        Ok(())
    }

    async fn open(&self, location: &StorageLocation) -> Result<ObjectStream, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(location.bucket())
            .key(location.object_name())
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                    StorageError::not_found(location)
                } else {
                    map_sdk_error(&e, location)
                }
            })?;

        Ok(ReaderStream::new(output.body.into_async_read()).boxed())
    }
}

#[async_trait]
impl StorageGateway for S3Gateway {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(
        &self,
        location: &StorageLocation,
        payload: ObjectPayload,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        cancellable(cancel, location, self.write(location, payload)).await
    }

    async fn get(
        &self,
        location: &StorageLocation,
        cancel: &CancellationToken,
    ) -> Result<ObjectStream, StorageError> {
        cancellable(cancel, location, self.open(location)).await
    }
}

/// Request body fed chunk by chunk from the payload stream.
///
/// The SDK requires a `Sync` body; the stream is only ever polled through
/// `&mut`, which `SyncStream` relies on.
fn streaming_body(content: ObjectStream) -> ByteStream {
    let frames = SyncStream::new(content.map_ok(Frame::data));
    ByteStream::from_body_1_x(StreamBody::new(frames))
}

/// Classify an SDK failure.
fn map_sdk_error<E>(err: &SdkError<E, HttpResponse>, location: &StorageLocation) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StorageError::backend_unreachable(location, detail)
        }
        SdkError::ServiceError(context) => {
            classify_service_error(context.err().code(), context.raw().status().as_u16())
                .into_error(location, detail)
        }
        SdkError::ResponseError(context) => {
            classify_service_error(None, context.raw().status().as_u16())
                .into_error(location, detail)
        }
        _ => StorageError::unknown(location, detail),
    }
}

/// Service-level failure class, decided from error code and HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceFailure {
    NotFound,
    Denied,
    Unavailable,
    Other,
}

impl ServiceFailure {
    fn into_error(self, location: &StorageLocation, detail: String) -> StorageError {
        match self {
            Self::NotFound => StorageError::not_found(location),
            Self::Denied => StorageError::bucket_unavailable(location, detail),
            Self::Unavailable => StorageError::backend_unreachable(location, detail),
            Self::Other => StorageError::unknown(location, detail),
        }
    }
}

fn classify_service_error(code: Option<&str>, status: u16) -> ServiceFailure {
    match (code, status) {
        (Some("NoSuchKey" | "NoSuchBucket" | "NotFound"), _) | (_, 404) => {
            ServiceFailure::NotFound
        }
        (
            Some(
                "AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId"
                | "SignatureDoesNotMatch",
            ),
            _,
        )
        | (_, 401 | 403) => ServiceFailure::Denied,
        (Some("SlowDown" | "ServiceUnavailable"), _) | (_, 502..=504) => {
            ServiceFailure::Unavailable
        }
        _ => ServiceFailure::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("NoSuchKey"), 404, ServiceFailure::NotFound)]
    #[case(Some("NoSuchBucket"), 404, ServiceFailure::NotFound)]
    #[case(None, 404, ServiceFailure::NotFound)]
    #[case(Some("AccessDenied"), 403, ServiceFailure::Denied)]
    #[case(None, 403, ServiceFailure::Denied)]
    #[case(Some("SignatureDoesNotMatch"), 403, ServiceFailure::Denied)]
    #[case(Some("SlowDown"), 503, ServiceFailure::Unavailable)]
    #[case(None, 502, ServiceFailure::Unavailable)]
    #[case(Some("InternalError"), 500, ServiceFailure::Other)]
    #[case(Some("InvalidRequest"), 400, ServiceFailure::Other)]
    fn test_classify_service_error(
        #[case] code: Option<&str>,
        #[case] status: u16,
        #[case] expected: ServiceFailure,
    ) {
        assert_eq!(classify_service_error(code, status), expected);
    }

    fn unreachable_config() -> GatewayConfig {
        // Port 1 on loopback refuses connections immediately.
        GatewayConfig {
            endpoint: "127.0.0.1:1".to_string(),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_put_unreachable_backend() {
        let gateway = S3Gateway::connect(&unreachable_config()).await;
        let loc = StorageLocation::new("uploads", "a.txt").expect("valid");

        let err = gateway
            .put(&loc, ObjectPayload::from_bytes("x"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::BackendUnreachable);
    }

    #[tokio::test]
    async fn test_get_unreachable_backend() {
        let gateway = S3Gateway::connect(&unreachable_config()).await;
        let loc = StorageLocation::new("uploads", "a.txt").expect("valid");

        let err = gateway
            .get(&loc, &CancellationToken::new())
            .await
            .err()
            .expect("should fail");
        assert_eq!(err.kind(), StorageErrorKind::BackendUnreachable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch() {
        let gateway = S3Gateway::connect(&unreachable_config()).await;
        let loc = StorageLocation::new("uploads", "a.txt").expect("valid");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gateway
            .put(&loc, ObjectPayload::from_bytes("x"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Cancelled);
    }
}
