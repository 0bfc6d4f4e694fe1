//! In-memory gateway for tests and local development.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::StorageError;
use super::gateway::{StorageGateway, cancellable};
use super::location::StorageLocation;
use super::payload::{ObjectPayload, ObjectStream, read_to_end};

#[derive(Debug, Clone)]
struct StoredObject {
    content: Bytes,
    content_type: String,
}

/// Gateway backed by concurrent maps.
///
/// A payload is collected in full before it is inserted, so an interrupted
/// put never leaves a partial object.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    buckets: DashMap<String, DashMap<String, StoredObject>>,
    buckets_created: AtomicUsize,
}

impl MemoryGateway {
    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many buckets this gateway has created.
    #[must_use]
    pub fn buckets_created(&self) -> usize {
        self.buckets_created.load(Ordering::SeqCst)
    }

    /// Whether `bucket` exists.
    #[must_use]
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Stored content type of an object.
    #[must_use]
    pub fn content_type(&self, location: &StorageLocation) -> Option<String> {
        self.lookup(location).map(|object| object.content_type)
    }

    /// Create `bucket` unless it exists. Returns whether this call created it.
    fn ensure_bucket(&self, bucket: &str) -> bool {
        match self.buckets.entry(bucket.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(DashMap::new());
                self.buckets_created.fetch_add(1, Ordering::SeqCst);
                debug!(bucket, "bucket created");
                true
            }
        }
    }

    fn lookup(&self, location: &StorageLocation) -> Option<StoredObject> {
        self.buckets
            .get(location.bucket())
            .and_then(|objects| objects.get(location.object_name()).map(|o| o.value().clone()))
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        location: &StorageLocation,
        payload: ObjectPayload,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        cancellable(cancel, location, async {
            self.ensure_bucket(location.bucket());

            let (content, size_hint, content_type) = payload.into_parts();
            let content = read_to_end(content)
                .await
                .map_err(|e| StorageError::invalid_payload(location, e.to_string()))?;

            if let Some(expected) = size_hint {
                if u64::try_from(content.len()).ok() != Some(expected) {
                    return Err(StorageError::invalid_payload(
                        location,
                        format!(
                            "payload length {} does not match declared size {expected}",
                            content.len()
                        ),
                    ));
                }
            }

            let Some(objects) = self.buckets.get(location.bucket()) else {
                return Err(StorageError::bucket_unavailable(
                    location,
                    "bucket vanished during write",
                ));
            };
            objects.insert(
                location.object_name().to_string(),
                StoredObject {
                    content,
                    content_type,
                },
            );
            Ok(())
        })
        .await
    }

    async fn get(
        &self,
        location: &StorageLocation,
        cancel: &CancellationToken,
    ) -> Result<ObjectStream, StorageError> {
        cancellable(cancel, location, async {
            let object = self
                .lookup(location)
                .ok_or_else(|| StorageError::not_found(location))?;
            let content = object.content;
            Ok(stream::once(async move { Ok(content) }).boxed())
        })
        .await
    }
}
