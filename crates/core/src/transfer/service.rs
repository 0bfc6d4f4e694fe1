//! Upload/download use cases.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stowage_shared::GatewayConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::storage::{
    KeyResolver, ObjectPayload, ObjectStream, StorageError, StorageGateway, StorageLocation,
};

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Bucket the object was written to.
    pub bucket: String,
    /// Object name within the bucket.
    pub object_name: String,
}

impl From<StorageLocation> for UploadResult {
    fn from(location: StorageLocation) -> Self {
        Self {
            bucket: location.bucket().to_string(),
            object_name: location.object_name().to_string(),
        }
    }
}

/// Lifecycle of a single request.
///
/// `Received → Validated → KeyResolved → Delegated → Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Request accepted.
    Received,
    /// Inputs checked.
    Validated,
    /// Bucket and object name settled.
    KeyResolved,
    /// Handed to the backend.
    Delegated,
    /// Backend finished successfully.
    Completed,
    /// Stopped with an error.
    Failed,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::KeyResolved => "key_resolved",
            Self::Delegated => "delegated",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Stateless orchestrator over one shared gateway.
///
/// Cheap to clone; every clone shares the same backend handle.
#[derive(Clone)]
pub struct TransferService {
    gateway: Arc<dyn StorageGateway>,
    resolver: KeyResolver,
    allow_empty_uploads: bool,
    request_timeout: Option<Duration>,
}

impl TransferService {
    /// Create a service over `gateway` with settings from `config`.
    #[must_use]
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &GatewayConfig) -> Self {
        Self {
            gateway,
            resolver: KeyResolver::from_config(config),
            allow_empty_uploads: config.allow_empty_uploads,
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Bucket used when a request names none.
    #[must_use]
    pub fn default_bucket(&self) -> &str {
        self.resolver.default_bucket()
    }

    /// Store a payload and report where it went.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the payload is missing, empty while empty uploads
    ///   are disallowed, or the bucket/name is illegal
    /// - `Cancelled` if `cancel` fires or the request deadline passes
    /// - any backend error, unchanged
    pub async fn upload(
        &self,
        payload: Option<ObjectPayload>,
        requested_bucket: Option<&str>,
        requested_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, StorageError> {
        trace_stage("upload", TransferStage::Received, None);

        let payload = payload.ok_or_else(|| StorageError::invalid_input("file is required"))?;
        if payload.is_known_empty() && !self.allow_empty_uploads {
            return Err(StorageError::invalid_input("file must not be empty"));
        }
        trace_stage("upload", TransferStage::Validated, None);

        let location = self.resolver.resolve(requested_bucket, requested_name)?;
        trace_stage("upload", TransferStage::KeyResolved, Some(&location));

        trace_stage("upload", TransferStage::Delegated, Some(&location));
        let scope = cancel.child_token();
        let outcome = self
            .with_deadline(&scope, self.gateway.put(&location, payload, &scope))
            .await;

        finish("upload", &location, outcome).map(|()| UploadResult::from(location))
    }

    /// Open an object for streaming.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `object_name` is absent or blank (checked before
    ///   any backend call) or the bucket is illegal
    /// - `ObjectNotFound` if nothing is stored at the location
    /// - `Cancelled` if `cancel` fires or the request deadline passes
    /// - any other backend error, unchanged
    pub async fn download(
        &self,
        bucket: Option<&str>,
        object_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ObjectStream, StorageError> {
        trace_stage("download", TransferStage::Received, None);

        let Some(object_name) = object_name.filter(|name| !name.trim().is_empty()) else {
            return Err(StorageError::invalid_input("objectName is required"));
        };
        trace_stage("download", TransferStage::Validated, None);

        let location = self.resolver.resolve(bucket, Some(object_name))?;
        trace_stage("download", TransferStage::KeyResolved, Some(&location));

        trace_stage("download", TransferStage::Delegated, Some(&location));
        let scope = cancel.child_token();
        let outcome = self
            .with_deadline(&scope, self.gateway.get(&location, &scope))
            .await;

        finish("download", &location, outcome)
    }

    /// Apply the configured request deadline.
    ///
    /// Expiry cancels `scope` and then lets the backend wind down, so it can
    /// discard partial writes before reporting `Cancelled`.
    async fn with_deadline<T, F>(
        &self,
        scope: &CancellationToken,
        operation: F,
    ) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let Some(limit) = self.request_timeout else {
            return operation.await;
        };

        tokio::pin!(operation);
        tokio::select! {
            biased;
            result = &mut operation => result,
            () = tokio::time::sleep(limit) => {
                debug!(?limit, "request deadline passed");
                scope.cancel();
                operation.await
            }
        }
    }
}

impl fmt::Debug for TransferService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferService")
            .field("backend", &self.gateway.name())
            .field("resolver", &self.resolver)
            .field("allow_empty_uploads", &self.allow_empty_uploads)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn trace_stage(operation: &'static str, stage: TransferStage, location: Option<&StorageLocation>) {
    match location {
        Some(location) => debug!(operation, %stage, %location, "transfer stage"),
        None => debug!(operation, %stage, "transfer stage"),
    }
}

fn finish<T>(
    operation: &'static str,
    location: &StorageLocation,
    outcome: Result<T, StorageError>,
) -> Result<T, StorageError> {
    match &outcome {
        Ok(_) => trace_stage(operation, TransferStage::Completed, Some(location)),
        Err(e) => warn!(
            operation,
            stage = %TransferStage::Failed,
            %location,
            kind = ?e.kind(),
            error = %e,
            "transfer failed"
        ),
    }
    outcome
}
