//! The put/get capability every backend implements.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use super::location::StorageLocation;
use super::payload::{ObjectPayload, ObjectStream};

/// Backend-independent object storage contract.
///
/// Implementations are shared across concurrent requests behind an `Arc` and
/// hold no per-request state.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Store `payload` at `location`, replacing any existing object.
    ///
    /// The bucket is created first when missing. Losing a creation race to
    /// another writer counts as success. When `cancel` fires before the write
    /// commits, nothing becomes visible at `location`.
    async fn put(
        &self,
        location: &StorageLocation,
        payload: ObjectPayload,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;

    /// Open the object at `location` for reading.
    ///
    /// The stream owns the backend resources it reads from.
    async fn get(
        &self,
        location: &StorageLocation,
        cancel: &CancellationToken,
    ) -> Result<ObjectStream, StorageError>;
}

/// Run a backend operation until it finishes or `cancel` fires.
///
/// Cancellation drops the operation future, aborting any in-flight call.
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    location: &StorageLocation,
    operation: F,
) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StorageError::cancelled(location)),
        result = operation => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageErrorKind;

    fn location() -> StorageLocation {
        StorageLocation::new("uploads", "a.txt").expect("valid location")
    }

    #[tokio::test]
    async fn test_cancellable_completes() {
        let cancel = CancellationToken::new();
        let result = cancellable(&cancel, &location(), async { Ok(7) }).await;
        assert_eq!(result.expect("should complete"), 7);
    }

    #[tokio::test]
    async fn test_cancellable_precancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cancellable(&cancel, &location(), async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellable_interrupts_pending_operation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = cancellable(
            &cancel,
            &location(),
            std::future::pending::<Result<(), StorageError>>(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Cancelled);
    }
}
