//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Which registry backend the server persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryBackend {
    File,
    Redis,
}

/// Which storage controller hands out claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Environment (development/production)
    pub environment: String,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Signs long-lived authority keys
    pub authority_secret: String,
    /// Signs short-lived session tokens
    pub session_secret: String,
    pub session_ttl: Duration,
    pub registry_backend: RegistryBackend,
    pub storage_backend: StorageBackend,
    /// Root of `file://` claims when the storage backend is local
    pub storage_path: PathBuf,
    /// Run the publish and concat workers in this process
    pub contracter_enabled: bool,
    /// Requests per second allowed on the authority and session routes
    pub auth_rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
            authority_secret: String::new(),
            session_secret: String::new(),
            session_ttl: Duration::from_secs(120),
            registry_backend: RegistryBackend::File,
            storage_backend: StorageBackend::Local,
            storage_path: PathBuf::from("fftb-storage"),
            contracter_enabled: false,
            auth_rate_limit_rps: 5,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            authority_secret: std::env::var("AUTHORITY_SECRET").unwrap_or_default(),
            session_secret: std::env::var("SESSION_SECRET").unwrap_or_default(),
            session_ttl: Duration::from_secs(
                std::env::var("SESSION_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            registry_backend: match std::env::var("REGISTRY_BACKEND").as_deref() {
                Ok("redis") => RegistryBackend::Redis,
                _ => RegistryBackend::File,
            },
            storage_backend: match std::env::var("STORAGE_BACKEND").as_deref() {
                Ok("s3") => StorageBackend::S3,
                _ => StorageBackend::Local,
            },
            storage_path: std::env::var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            contracter_enabled: std::env::var("CONTRACTER_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            auth_rate_limit_rps: std::env::var("AUTH_RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.auth_rate_limit_rps),
            max_body_size: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
