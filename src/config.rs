use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub node: NodeConfig,
    pub storage: StorageConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Externally reachable base URL of this service, used for locally signed object URLs.
    pub public_base_url: String,
}

#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 key used to verify bearer tokens
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
    S3,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Gcs => "gcs",
            StorageBackend::Local => "local",
            StorageBackend::S3 => "s3",
        }
    }
}

#[derive(Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// HMAC key for signing local object URLs
    pub local_signing_secret: String,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to ADC; required for signed URLs)
    pub gcs_credentials_file: Option<String>,
    pub s3: S3Config,
}

#[derive(Clone, Default)]
pub struct S3Config {
    /// API endpoint, e.g. `http://minio:9000`
    pub endpoint: Option<String>,
    /// Public endpoint used when minting presigned URLs. Falls back to `endpoint`.
    pub external_url: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("external_url", &self.external_url)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("local_storage_path", &self.local_storage_path)
            .field("gcs_bucket", &self.gcs_bucket)
            .field("gcs_credentials_file", &self.gcs_credentials_file)
            .field("s3", &self.s3)
            .finish_non_exhaustive()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            local_signing_secret: random_secret(),
            gcs_bucket: None,
            gcs_credentials_file: None,
            s3: S3Config {
                region: "us-east-1".to_string(),
                ..Default::default()
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            "s3" | "minio" => StorageBackend::S3,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let local_signing_secret = match std::env::var("LOCAL_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                if storage_backend == StorageBackend::Local {
                    tracing::warn!(
                        "LOCAL_SIGNING_SECRET not set; signed object URLs will not survive a restart"
                    );
                }
                random_secret()
            }
        };

        let gcs_bucket = std::env::var("GCS_BUCKET").ok();
        let gcs_credentials_file = std::env::var("GCS_CREDENTIALS_FILE").ok();

        let s3 = S3Config {
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            external_url: std::env::var("S3_EXTERNAL_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            bucket: std::env::var("S3_BUCKET").ok(),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: std::env::var("S3_ACCESS_KEY").ok(),
            secret_key: std::env::var("S3_SECRET_KEY").ok(),
        };

        let jwt_secret = std::env::var("JWT_SECRET_KEY").unwrap_or_default();

        let config = Config {
            auth: AuthConfig { jwt_secret },
            node: NodeConfig {
                bind_address,
                data_dir,
                public_base_url,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                local_signing_secret,
                gcs_bucket,
                gcs_credentials_file,
                s3,
            },
            test_mode,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET_KEY cannot be empty".to_string(),
            ));
        }

        if !is_http_url(&self.node.public_base_url) {
            return Err(ConfigError::ValidationError(format!(
                "PUBLIC_BASE_URL must be an http(s) URL, got '{}'",
                self.node.public_base_url
            )));
        }

        match self.storage.backend {
            StorageBackend::Gcs if self.storage.gcs_bucket.is_none() => {
                return Err(ConfigError::ValidationError(
                    "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
                ));
            }
            StorageBackend::S3 => {
                let s3 = &self.storage.s3;
                let missing: Vec<&str> = [
                    ("S3_ENDPOINT", s3.endpoint.is_none()),
                    ("S3_BUCKET", s3.bucket.is_none()),
                    ("S3_ACCESS_KEY", s3.access_key.is_none()),
                    ("S3_SECRET_KEY", s3.secret_key.is_none()),
                ]
                .into_iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| name)
                .collect();
                if !missing.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "{} required when STORAGE_BACKEND=s3",
                        missing.join(", ")
                    )));
                }
                for url in [&s3.endpoint, &s3.external_url].into_iter().flatten() {
                    if !is_http_url(url) {
                        return Err(ConfigError::ValidationError(format!(
                            "S3 endpoint must be an http(s) URL, got '{url}'"
                        )));
                    }
                }
            }
            _ => {}
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn random_secret() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            auth: AuthConfig {
                jwt_secret: "secret".to_string(),
            },
            node: NodeConfig::default(),
            storage: StorageConfig::default(),
            test_mode: false,
            max_upload_size: 1024,
        }
    }

    #[test]
    fn test_default_local_config_is_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_jwt_secret_rejected() {
        let mut config = valid_config();
        config.auth.jwt_secret.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gcs_requires_bucket() {
        let mut config = valid_config();
        config.storage.backend = StorageBackend::Gcs;
        assert!(config.validate().is_err());

        config.storage.gcs_bucket = Some("docs".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_requires_endpoint_and_keys() {
        let mut config = valid_config();
        config.storage.backend = StorageBackend::S3;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("S3_ENDPOINT"));
        assert!(err.contains("S3_SECRET_KEY"));

        config.storage.s3.endpoint = Some("http://minio:9000".to_string());
        config.storage.s3.bucket = Some("documents".to_string());
        config.storage.s3.access_key = Some("minio".to_string());
        config.storage.s3.secret_key = Some("minio123".to_string());
        assert!(config.validate().is_ok());

        config.storage.s3.external_url = Some("files.example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = valid_config();
        config.storage.s3.secret_key = Some("very-secret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("jwt_secret: \"secret\""));
    }
}
