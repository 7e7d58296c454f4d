//! Configuration module for recman.

use serde::Deserialize;
use std::path::Path;

use crate::{RecmanError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timezone for calendar dates in elapsed-time strings (e.g., "UTC", "Asia/Ho_Chi_Minh").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timezone: default_timezone(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/recman.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Which blob store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// S3-compatible object storage.
    S3,
    /// Local directory acting as a bucket.
    Filesystem,
    /// In-process map (lost on restart).
    Memory,
}

/// S3 connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Endpoint URL (e.g., "https://s3.amazonaws.com", "http://minio:9000").
    /// When empty the SDK default endpoint for the region is used.
    #[serde(default)]
    pub endpoint: String,
    /// Region name.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Force path-style URLs (required for MinIO).
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            access_key: String::new(),
            secret_key: String::new(),
            force_path_style: false,
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Bucket name.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Listing page size for the filesystem and memory backends.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Root directory for the filesystem backend.
    #[serde(default = "default_filesystem_path")]
    pub filesystem_path: String,
    /// Directory for staging uploads before they are written to the store.
    /// Empty means the system temp directory.
    #[serde(default)]
    pub temp_dir: String,
    /// S3 settings.
    #[serde(default)]
    pub s3: S3Config,
}

fn default_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_bucket() -> String {
    "medical-records".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_filesystem_path() -> String {
    "data/blobs".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: default_bucket(),
            page_size: default_page_size(),
            filesystem_path: default_filesystem_path(),
            temp_dir: String::new(),
            s3: S3Config::default(),
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_max_upload_size() -> u64 {
    10
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/recman.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Web API configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebConfig {
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// JWT secret used to verify bearer tokens (must be set).
    #[serde(default)]
    pub jwt_secret: String,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload limits.
    #[serde(default)]
    pub files: FilesConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RecmanError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RecmanError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `RECMAN_JWT_SECRET`: JWT verification secret
    /// - `RECMAN_S3_ACCESS_KEY`: S3 access key ID
    /// - `RECMAN_S3_SECRET_KEY`: S3 secret access key
    /// - `RECMAN_BUCKET`: bucket name
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env("RECMAN_JWT_SECRET") {
            self.web.jwt_secret = v;
        }
        if let Some(v) = non_empty_env("RECMAN_S3_ACCESS_KEY") {
            self.storage.s3.access_key = v;
        }
        if let Some(v) = non_empty_env("RECMAN_S3_SECRET_KEY") {
            self.storage.s3.secret_key = v;
        }
        if let Some(v) = non_empty_env("RECMAN_BUCKET") {
            self.storage.bucket = v;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the JWT secret is not set
    /// - the bucket name is empty
    /// - the S3 backend is selected without credentials
    pub fn validate(&self) -> Result<()> {
        if self.web.jwt_secret.is_empty() {
            return Err(RecmanError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via RECMAN_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(RecmanError::Config("storage.bucket must not be empty".to_string()));
        }
        if self.storage.backend == StorageBackend::S3
            && (self.storage.s3.access_key.is_empty() || self.storage.s3.secret_key.is_empty())
        {
            return Err(RecmanError::Config(
                "S3 backend requires storage.s3.access_key and storage.s3.secret_key \
                 (or RECMAN_S3_ACCESS_KEY / RECMAN_S3_SECRET_KEY)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.files.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
