//! Object payloads and byte streams.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

/// Content type used when the caller supplies none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Owned stream of object bytes.
///
/// Dropping the stream releases whatever backend resource feeds it.
pub type ObjectStream = BoxStream<'static, io::Result<Bytes>>;

/// Bytes to store plus what is known about them.
pub struct ObjectPayload {
    content: ObjectStream,
    size_hint: Option<u64>,
    content_type: String,
}

impl ObjectPayload {
    /// Wrap a byte stream.
    pub fn from_stream<S>(content: S, size_hint: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            content: content.boxed(),
            size_hint,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Wrap an in-memory buffer. The size hint is exact.
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let size = u64::try_from(content.len()).ok();
        Self::from_stream(stream::once(async move { Ok(content) }), size)
    }

    /// Set the content type. Blank values keep the default.
    #[must_use]
    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        if let Some(ct) = content_type.map(str::trim).filter(|ct| !ct.is_empty()) {
            self.content_type = ct.to_string();
        }
        self
    }

    /// Declared length, if known.
    #[must_use]
    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    /// MIME type of the content.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Whether the payload is known to be empty.
    #[must_use]
    pub fn is_known_empty(&self) -> bool {
        self.size_hint == Some(0)
    }

    /// Split into stream, size hint and content type.
    #[must_use]
    pub fn into_parts(self) -> (ObjectStream, Option<u64>, String) {
        (self.content, self.size_hint, self.content_type)
    }
}

impl fmt::Debug for ObjectPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPayload")
            .field("size_hint", &self.size_hint)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Drain a stream into one contiguous buffer.
///
/// Memory use grows with the object; only for consumers that cannot take a
/// stream.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub async fn read_to_end(content: ObjectStream) -> io::Result<Bytes> {
    let buffer = content
        .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
            buffer.extend_from_slice(&chunk);
            Ok(buffer)
        })
        .await?;
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_bytes_roundtrip() {
        let payload = ObjectPayload::from_bytes("hello");
        assert_eq!(payload.size_hint(), Some(5));
        assert_eq!(payload.content_type(), DEFAULT_CONTENT_TYPE);

        let (content, _, _) = payload.into_parts();
        let bytes = read_to_end(content).await.expect("should read");
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_to_end_joins_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"he")),
            Ok(Bytes::from_static(b"ll")),
            Ok(Bytes::from_static(b"o")),
        ];
        let bytes = read_to_end(stream::iter(chunks).boxed())
            .await
            .expect("should read");
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_to_end_surfaces_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"he")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let err = read_to_end(stream::iter(chunks).boxed()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_content_type_override() {
        let payload = ObjectPayload::from_bytes("x").with_content_type(Some("text/plain"));
        assert_eq!(payload.content_type(), "text/plain");

        let blank = ObjectPayload::from_bytes("x").with_content_type(Some("  "));
        assert_eq!(blank.content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_known_empty() {
        assert!(ObjectPayload::from_bytes(Bytes::new()).is_known_empty());
        let unsized_empty = ObjectPayload::from_stream(stream::empty::<io::Result<Bytes>>(), None);
        assert!(!unsized_empty.is_known_empty());
    }
}
