//! Local filesystem gateway built on Apache OpenDAL.
//!
//! Each bucket is a top-level directory under the configured root. Writes go
//! through a staging directory and are renamed into place on close, so a
//! cancelled or failed write never exposes a partial object.

use std::path::Path;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use opendal::{ErrorKind, Operator, Writer, layers::LoggingLayer, services};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ConfigurationError, StorageError, from_opendal};
use super::gateway::{StorageGateway, cancellable};
use super::location::StorageLocation;
use super::payload::{ObjectPayload, ObjectStream};

/// Staging directory for in-flight writes, relative to the root. Its leading
/// dot keeps it outside the legal bucket namespace.
pub(crate) const STAGING_DIR: &str = ".staging";

/// Filesystem gateway.
#[derive(Debug, Clone)]
pub struct FsGateway {
    operator: Operator,
}

impl FsGateway {
    /// Create a gateway rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not valid UTF-8 or the operator cannot
    /// be built.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let root = root.as_ref();
        let root_str = root
            .to_str()
            .ok_or_else(|| ConfigurationError::Invalid("invalid filesystem root".to_string()))?;
        let staging = root.join(STAGING_DIR);
        let staging_str = staging
            .to_str()
            .ok_or_else(|| ConfigurationError::Invalid("invalid staging path".to_string()))?;

        let builder = services::Fs::default()
            .root(root_str)
            .atomic_write_dir(staging_str);

        let operator = Operator::new(builder)
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?
            .layer(LoggingLayer::default())
            .finish();

        Ok(Self { operator })
    }

    /// Check-then-create the bucket directory.
    ///
    /// Directory creation is idempotent, so a concurrent creator that wins
    /// the race leaves this call successful.
    async fn ensure_bucket(&self, location: &StorageLocation) -> Result<(), StorageError> {
        let dir = format!("{}/", location.bucket());
        match self.operator.stat(&dir).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(StorageError::bucket_unavailable(
                    location,
                    "bucket path exists but is not a directory",
                ));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(from_opendal(&e, location)),
        }

        debug!(bucket = location.bucket(), "creating bucket directory");
        self.operator
            .create_dir(&dir)
            .await
            .map_err(|e| from_opendal(&e, location))
    }

    async fn write(
        &self,
        location: &StorageLocation,
        payload: ObjectPayload,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        cancellable(cancel, location, self.ensure_bucket(location)).await?;

        let (content, size_hint, _content_type) = payload.into_parts();
        // Not raced against `cancel`: the staging file may already exist
        // when this resolves, and only a live writer can remove it.
        let mut writer = self
            .operator
            .writer(&location.path())
            .await
            .map_err(|e| from_opendal(&e, location))?;

        // The writer must see abort() on every failure, cancellation included,
        // or its staging file outlives the request.
        let copied = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StorageError::cancelled(location)),
            result = copy_into(&mut writer, content, size_hint, location) => result,
        };
        if let Err(e) = copied {
            if let Err(abort_err) = writer.abort().await {
                warn!(error = %abort_err, location = %location, "failed to abort write");
            }
            return Err(e);
        }

        writer
            .close()
            .await
            .map_err(|e| from_opendal(&e, location))?;
        Ok(())
    }

    async fn open(&self, location: &StorageLocation) -> Result<ObjectStream, StorageError> {
        let path = location.path();
        let meta = self
            .operator
            .stat(&path)
            .await
            .map_err(|e| from_opendal(&e, location))?;
        if meta.is_dir() {
            return Err(StorageError::not_found(location));
        }

        let reader = self
            .operator
            .reader(&path)
            .await
            .map_err(|e| from_opendal(&e, location))?;
        let stream = reader
            .into_bytes_stream(..)
            .await
            .map_err(|e| from_opendal(&e, location))?;
        Ok(stream.boxed())
    }
}

#[async_trait]
impl StorageGateway for FsGateway {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn put(
        &self,
        location: &StorageLocation,
        payload: ObjectPayload,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.write(location, payload, cancel).await
    }

    async fn get(
        &self,
        location: &StorageLocation,
        cancel: &CancellationToken,
    ) -> Result<ObjectStream, StorageError> {
        cancellable(cancel, location, self.open(location)).await
    }
}

/// Feed the payload into `writer`, checking the declared size.
async fn copy_into(
    writer: &mut Writer,
    mut content: ObjectStream,
    size_hint: Option<u64>,
    location: &StorageLocation,
) -> Result<(), StorageError> {
    let mut written: u64 = 0;
    while let Some(chunk) = content
        .try_next()
        .await
        .map_err(|e| StorageError::invalid_payload(location, e.to_string()))?
    {
        written += chunk.len() as u64;
        writer
            .write(chunk)
            .await
            .map_err(|e| from_opendal(&e, location))?;
    }

    match size_hint {
        Some(expected) if written != expected => Err(StorageError::invalid_payload(
            location,
            format!("payload length {written} does not match declared size {expected}"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::storage::{StorageErrorKind, read_to_end};

    fn location(bucket: &str, name: &str) -> StorageLocation {
        StorageLocation::new(bucket, name).expect("valid location")
    }

    fn staging_entries(root: &Path) -> usize {
        std::fs::read_dir(root.join(STAGING_DIR)).map_or(0, Iterator::count)
    }

    /// One chunk arrives, then the sender stalls forever.
    fn stalled_payload() -> ObjectPayload {
        let content = stream::once(async { Ok(Bytes::from_static(b"partial")) })
            .chain(stream::pending());
        ObjectPayload::from_stream(content, None)
    }

    #[tokio::test]
    async fn test_roundtrip_creates_bucket_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");
        let loc = location("uploads", "reports/q1.txt");

        gateway
            .put(&loc, ObjectPayload::from_bytes("hello"), &CancellationToken::new())
            .await
            .expect("put should succeed");

        assert!(dir.path().join("uploads").is_dir());
        let stream = gateway
            .get(&loc, &CancellationToken::new())
            .await
            .expect("get should succeed");
        assert_eq!(&read_to_end(stream).await.expect("read")[..], b"hello");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");

        let err = gateway
            .get(&location("uploads", "missing.txt"), &CancellationToken::new())
            .await
            .err()
            .expect("should fail");
        assert_eq!(err.kind(), StorageErrorKind::ObjectNotFound);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");
        let loc = location("uploads", "a.txt");
        let cancel = CancellationToken::new();

        gateway
            .put(&loc, ObjectPayload::from_bytes("a much longer first body"), &cancel)
            .await
            .expect("first put");
        gateway
            .put(&loc, ObjectPayload::from_bytes("short"), &cancel)
            .await
            .expect("second put");

        let stream = gateway.get(&loc, &cancel).await.expect("get");
        assert_eq!(&read_to_end(stream).await.expect("read")[..], b"short");
    }

    #[tokio::test]
    async fn test_concurrent_bucket_creation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");

        let first = location("race-bucket", "one.txt");
        let second = location("race-bucket", "two.txt");
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            gateway.put(&first, ObjectPayload::from_bytes("1"), &cancel),
            gateway.put(&second, ObjectPayload::from_bytes("2"), &cancel),
        );
        a.expect("first writer succeeds");
        b.expect("second writer succeeds");
    }

    #[tokio::test]
    async fn test_cancelled_write_is_invisible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");
        let loc = location("uploads", "partial.bin");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = gateway
            .put(&loc, stalled_payload(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Cancelled);

        let missing = gateway
            .get(&loc, &CancellationToken::new())
            .await
            .err()
            .expect("partial object must not be visible");
        assert_eq!(missing.kind(), StorageErrorKind::ObjectNotFound);
    }

    #[tokio::test]
    async fn test_cancelled_writes_leave_no_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");

        for i in 0..5 {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                trigger.cancel();
            });

            let err = gateway
                .put(
                    &location("uploads", &format!("partial-{i}.bin")),
                    stalled_payload(),
                    &cancel,
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), StorageErrorKind::Cancelled);
        }

        assert_eq!(staging_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_stream_error_aborts_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = FsGateway::new(dir.path()).expect("should build");
        let loc = location("uploads", "broken.bin");

        let content = stream::iter(vec![
            Ok(Bytes::from_static(b"head")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client gone")),
        ]);
        let err = gateway
            .put(
                &loc,
                ObjectPayload::from_stream(content, None),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidInput);

        let missing = gateway
            .get(&loc, &CancellationToken::new())
            .await
            .err()
            .expect("aborted object must not be visible");
        assert_eq!(missing.kind(), StorageErrorKind::ObjectNotFound);
        assert_eq!(staging_entries(dir.path()), 0);
    }
}
