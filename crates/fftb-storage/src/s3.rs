//! S3-compatible object storage backend.
//!
//! Claims handed out by this controller carry presigned URLs, so performers
//! read and write them over plain HTTP through [`HttpStorageClaim`].

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::{debug, info};
use url::Url;

use crate::claim::{check_claim_id, StorageClaim, StorageController};
use crate::error::{StorageError, StorageResult};
use crate::http::HttpStorageClaim;

/// Presigned URL lifetime.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the S3 controller.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" works for most S3-compatible providers)
    pub region: String,
    /// Lifetime of presigned URLs
    pub presign_ttl: Duration,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET")
                .map_err(|_| StorageError::config_error("S3_BUCKET not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            presign_ttl: std::env::var("S3_PRESIGN_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PRESIGN_TTL),
        })
    }
}

/// Controller storing claims as objects in one bucket.
#[derive(Clone)]
pub struct S3StorageController {
    client: Client,
    bucket: String,
    presign_ttl: Duration,
    http: reqwest::Client,
}

impl S3StorageController {
    pub fn new(config: S3Config, http: reqwest::Client) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "fftb",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!(bucket = %config.bucket_name, endpoint = %config.endpoint_url, "S3 storage controller ready");

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            presign_ttl: config.presign_ttl,
            http,
        }
    }

    pub fn from_env(http: reqwest::Client) -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?, http))
    }

    /// Size of the object, `None` when it does not exist.
    async fn head(&self, key: &str) -> StorageResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(output.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) => {
                let message = e.to_string();
                if e.into_service_error().is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::AwsSdk(message))
                }
            }
        }
    }

    fn presigning(&self) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(self.presign_ttl)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))
    }

    fn parse_presigned(uri: &str) -> StorageResult<Url> {
        Url::parse(uri).map_err(|e| StorageError::PresignFailed(format!("{}: {}", uri, e)))
    }
}

#[async_trait]
impl StorageController for S3StorageController {
    async fn allocate_storage_claim(&self, id: &str) -> StorageResult<Box<dyn StorageClaim>> {
        check_claim_id(id)?;

        if self.head(id).await?.is_some() {
            return Err(StorageError::already_allocated(id));
        }

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(id)
            .presigned(self.presigning()?)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        debug!(claim_id = %id, "Allocated S3 storage claim");

        let url = Self::parse_presigned(presigned.uri())?;
        Ok(Box::new(HttpStorageClaim::new(self.http.clone(), id, url, 0)))
    }

    async fn build_storage_claim(&self, id: &str) -> StorageResult<Box<dyn StorageClaim>> {
        check_claim_id(id)?;

        let size = self
            .head(id)
            .await?
            .ok_or_else(|| StorageError::missing_file(id))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(id)
            .presigned(self.presigning()?)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let url = Self::parse_presigned(presigned.uri())?;
        Ok(Box::new(HttpStorageClaim::new(self.http.clone(), id, url, size)))
    }

    async fn purge_storage_claim(&self, id: &str) -> StorageResult<()> {
        check_claim_id(id)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        debug!(claim_id = %id, "Purged S3 storage claim");
        Ok(())
    }
}
