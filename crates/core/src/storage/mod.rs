//! Object storage gateway: addressing, the capability trait and its backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        StorageGateway                           │
//! │            put(location, payload) │ get(location)               │
//! ├─────────────────────┬─────────────────────┬─────────────────────┤
//! │ S3Gateway           │ FsGateway           │ MemoryGateway       │
//! │ aws-sdk-s3          │ OpenDAL services-fs │ DashMap             │
//! └─────────────────────┴─────────────────────┴─────────────────────┘
//! ```
//!
//! One gateway is built at startup and shared by reference across requests.

mod error;
mod fs;
mod gateway;
mod location;
mod memory;
mod payload;
mod s3;

use std::sync::Arc;

use stowage_shared::{BackendKind, GatewayConfig};
use tracing::info;

pub use error::{ConfigurationError, StorageError, StorageErrorKind};
pub use fs::FsGateway;
#[cfg(test)]
pub(crate) use fs::STAGING_DIR;
pub use gateway::StorageGateway;
pub use location::{
    KeyResolver, MAX_BUCKET_LEN, MAX_OBJECT_NAME_LEN, MIN_BUCKET_LEN, StorageLocation,
    validate_bucket_name,
};
pub use memory::MemoryGateway;
pub use payload::{DEFAULT_CONTENT_TYPE, ObjectPayload, ObjectStream, read_to_end};
pub use s3::S3Gateway;

/// Build the process-wide gateway selected by `config.backend`.
///
/// # Errors
///
/// Returns an error if the selected backend cannot be initialized.
pub async fn build_gateway(
    config: &GatewayConfig,
) -> Result<Arc<dyn StorageGateway>, ConfigurationError> {
    validate_bucket_name(&config.default_bucket).map_err(|e| {
        ConfigurationError::Invalid(format!("default bucket: {e}"))
    })?;

    let gateway: Arc<dyn StorageGateway> = match config.backend {
        BackendKind::S3 => Arc::new(S3Gateway::connect(config).await),
        BackendKind::Fs => Arc::new(FsGateway::new(&config.root)?),
        BackendKind::Memory => Arc::new(MemoryGateway::new()),
    };

    info!(
        backend = gateway.name(),
        default_bucket = %config.default_bucket,
        "Storage gateway ready"
    );
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_memory_gateway() {
        let config = GatewayConfig::default().with_backend(BackendKind::Memory);
        let gateway = build_gateway(&config).await.expect("should build");
        assert_eq!(gateway.name(), "memory");
    }

    #[tokio::test]
    async fn test_build_fs_gateway() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = GatewayConfig {
            root: dir.path().to_string_lossy().into_owned(),
            ..GatewayConfig::default().with_backend(BackendKind::Fs)
        };
        let gateway = build_gateway(&config).await.expect("should build");
        assert_eq!(gateway.name(), "fs");
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_default_bucket() {
        let config = GatewayConfig::default()
            .with_backend(BackendKind::Memory)
            .with_default_bucket("Not_Valid");
        let err = build_gateway(&config).await.err().expect("should fail");
        assert!(err.to_string().contains("default bucket"));
    }
}
