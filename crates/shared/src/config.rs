//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Object storage gateway configuration.
    #[serde(default)]
    pub storage: GatewayConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Which backend adapter the gateway is wired to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// S3-compatible object store (MinIO, AWS S3, R2, ...).
    #[default]
    S3,
    /// Local filesystem, one directory per bucket.
    Fs,
    /// Process-local map. Nothing survives a restart.
    Memory,
}

impl BackendKind {
    /// Short backend name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Fs => "fs",
            Self::Memory => "memory",
        }
    }
}

/// Object storage gateway configuration.
///
/// Loaded once at startup and never mutated afterwards. The camelCase aliases
/// accept the key spelling used by existing deployment files.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Backend adapter selection.
    #[serde(default)]
    pub backend: BackendKind,
    /// Object store endpoint, with or without scheme (`localhost:9000`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Access key ID.
    #[serde(default = "default_access_key", alias = "accessKey")]
    pub access_key: String,
    /// Secret access key.
    #[serde(default = "default_secret_key", alias = "secretKey")]
    pub secret_key: String,
    /// Use HTTPS when the endpoint carries no scheme.
    #[serde(default, alias = "useTLS", alias = "useTls")]
    pub use_tls: bool,
    /// Bucket used when a request names none.
    #[serde(default = "default_bucket", alias = "defaultBucket")]
    pub default_bucket: String,
    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Root directory for the filesystem backend.
    #[serde(default = "default_root")]
    pub root: String,
    /// Accept zero-length uploads.
    #[serde(default, alias = "allowEmptyUploads")]
    pub allow_empty_uploads: bool,
    /// Per-request deadline in seconds. No deadline when unset.
    #[serde(default, alias = "requestTimeoutSecs")]
    pub request_timeout_secs: Option<u64>,
    /// Largest accepted upload body in bytes.
    #[serde(default = "default_max_upload_bytes", alias = "maxUploadBytes")]
    pub max_upload_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            endpoint: default_endpoint(),
            access_key: default_access_key(),
            secret_key: default_secret_key(),
            use_tls: false,
            default_bucket: default_bucket(),
            region: default_region(),
            root: default_root(),
            allow_empty_uploads: false,
            request_timeout_secs: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl GatewayConfig {
    /// Endpoint as a URL, adding `http://` or `https://` per `use_tls` when
    /// the configured value has no scheme.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if self.use_tls {
            format!("https://{endpoint}")
        } else {
            format!("http://{endpoint}")
        }
    }

    /// Set the default bucket.
    #[must_use]
    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = bucket.into();
        self
    }

    /// Set the backend adapter.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Allow or reject zero-length uploads.
    #[must_use]
    pub fn with_allow_empty_uploads(mut self, allow: bool) -> Self {
        self.allow_empty_uploads = allow;
        self
    }

    /// Set the per-request deadline.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }
}

fn default_endpoint() -> String {
    "localhost:9000".to_string()
}

fn default_access_key() -> String {
    "minioadmin".to_string()
}

fn default_secret_key() -> String {
    "minioadmin".to_string()
}

fn default_bucket() -> String {
    "uploads".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_root() -> String {
    "./data".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("STOWAGE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.backend, BackendKind::S3);
        assert_eq!(config.endpoint, "localhost:9000");
        assert_eq!(config.default_bucket, "uploads");
        assert!(!config.use_tls);
        assert!(!config.allow_empty_uploads);
        assert_eq!(config.request_timeout_secs, None);
    }

    #[test]
    fn test_endpoint_url_scheme() {
        let plain = GatewayConfig::default();
        assert_eq!(plain.endpoint_url(), "http://localhost:9000");

        let tls = GatewayConfig {
            use_tls: true,
            ..GatewayConfig::default()
        };
        assert_eq!(tls.endpoint_url(), "https://localhost:9000");

        let explicit = GatewayConfig {
            endpoint: "https://s3.example.com/".to_string(),
            ..GatewayConfig::default()
        };
        assert_eq!(explicit.endpoint_url(), "https://s3.example.com");
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("STOWAGE__STORAGE__BACKEND", Some("memory")),
                ("STOWAGE__STORAGE__DEFAULT_BUCKET", Some("media")),
                ("STOWAGE__STORAGE__USE_TLS", Some("true")),
                ("STOWAGE__SERVER__PORT", Some("9090")),
            ],
            || {
                let config = AppConfig::load().expect("config should load");
                assert_eq!(config.storage.backend, BackendKind::Memory);
                assert_eq!(config.storage.default_bucket, "media");
                assert!(config.storage.use_tls);
                assert_eq!(config.server.port, 9090);
            },
        );
    }

    #[test]
    fn test_load_without_sources_uses_defaults() {
        temp_env::with_vars_unset(
            [
                "STOWAGE__STORAGE__BACKEND",
                "STOWAGE__STORAGE__DEFAULT_BUCKET",
                "STOWAGE__STORAGE__USE_TLS",
                "STOWAGE__SERVER__PORT",
            ],
            || {
                let config = AppConfig::load().expect("config should load");
                assert_eq!(config.storage.default_bucket, "uploads");
                assert_eq!(config.server.port, 8080);
            },
        );
    }

    #[test]
    fn test_camel_case_keys() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"accessKey":"ak","secretKey":"sk","useTLS":true,"defaultBucket":"docs"}"#,
        )
        .expect("should deserialize");
        assert_eq!(config.access_key, "ak");
        assert_eq!(config.secret_key, "sk");
        assert!(config.use_tls);
        assert_eq!(config.default_bucket, "docs");
    }
}
