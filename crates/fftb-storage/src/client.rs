//! URL-addressed storage clients.
//!
//! A [`StorageClient`] resolves claims from the URL a dealer handed out.
//! [`UniversalClient`] picks the right backend from the URL scheme.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::claim::{download_file, upload_file, StorageClaim};
use crate::error::{StorageError, StorageResult};
use crate::http::HttpStorageClaim;
use crate::local::LocalStorageClaim;

/// Resolves claims for one family of URLs.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Resolve an existing claim by URL.
    async fn build_storage_claim_by_url(&self, url: &Url) -> StorageResult<Box<dyn StorageClaim>>;

    /// Rebuild a claim handle from its wire form without touching the backend.
    fn claim_from_parts(&self, id: &str, url: &Url, size: u64) -> StorageResult<Box<dyn StorageClaim>>;

    /// Copy the claim into `dir`, reusing an existing copy of the same size.
    async fn make_local_copy(&self, claim: &dyn StorageClaim, dir: &Path) -> StorageResult<PathBuf> {
        let path = dir.join(claim.name());

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() == claim.size() && claim.size() > 0 {
                debug!(claim_id = %claim.id(), path = %path.display(), "Reusing local copy");
                return Ok(path);
            }
        }

        download_file(claim, &path).await?;
        Ok(path)
    }

    /// Remove a copy made by [`StorageClient::make_local_copy`].
    async fn remove_local_copy(&self, path: &Path) -> StorageResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Upload a local file into the claim and delete the local file.
    async fn move_file_to_storage_claim(&self, path: &Path, claim: &dyn StorageClaim) -> StorageResult<u64> {
        let written = upload_file(claim, path).await?;

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove moved file");
        }

        Ok(written)
    }
}

/// Client for `file://` URLs.
#[derive(Debug, Clone, Default)]
pub struct LocalStorageClient;

#[async_trait]
impl StorageClient for LocalStorageClient {
    async fn build_storage_claim_by_url(&self, url: &Url) -> StorageResult<Box<dyn StorageClaim>> {
        Ok(Box::new(LocalStorageClaim::from_url(url).await?))
    }

    fn claim_from_parts(&self, id: &str, url: &Url, size: u64) -> StorageResult<Box<dyn StorageClaim>> {
        let path = url
            .to_file_path()
            .map_err(|_| StorageError::InvalidUrl(url.to_string()))?;

        Ok(Box::new(LocalStorageClaim::new(id, path, size)?))
    }
}

/// Client for `http(s)://` URLs, typically presigned object storage URLs.
#[derive(Debug, Clone, Default)]
pub struct HttpStorageClient {
    http: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn build_storage_claim_by_url(&self, url: &Url) -> StorageResult<Box<dyn StorageClaim>> {
        Ok(Box::new(HttpStorageClaim::from_url(self.http.clone(), url).await?))
    }

    fn claim_from_parts(&self, id: &str, url: &Url, size: u64) -> StorageResult<Box<dyn StorageClaim>> {
        Ok(Box::new(HttpStorageClaim::new(self.http.clone(), id, url.clone(), size)))
    }
}

/// Dispatch table from URL scheme to client.
#[derive(Clone, Default)]
pub struct UniversalClient {
    clients: HashMap<String, Arc<dyn StorageClient>>,
}

impl UniversalClient {
    /// Empty table; every URL fails `UnknownClaimType` until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with `file`, `http` and `https` registered.
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let web: Arc<dyn StorageClient> = Arc::new(HttpStorageClient::new(http));

        Self::new()
            .with_client("file", Arc::new(LocalStorageClient))
            .with_client("http", web.clone())
            .with_client("https", web)
    }

    /// Register `client` for `scheme`, replacing any previous entry.
    pub fn with_client(mut self, scheme: &str, client: Arc<dyn StorageClient>) -> Self {
        self.clients.insert(scheme.to_ascii_lowercase(), client);
        self
    }

    fn client_for(&self, url: &Url) -> StorageResult<&Arc<dyn StorageClient>> {
        self.clients
            .get(url.scheme())
            .ok_or_else(|| StorageError::UnknownClaimType(url.scheme().to_string()))
    }
}

#[async_trait]
impl StorageClient for UniversalClient {
    async fn build_storage_claim_by_url(&self, url: &Url) -> StorageResult<Box<dyn StorageClaim>> {
        self.client_for(url)?.build_storage_claim_by_url(url).await
    }

    fn claim_from_parts(&self, id: &str, url: &Url, size: u64) -> StorageResult<Box<dyn StorageClaim>> {
        self.client_for(url)?.claim_from_parts(id, url, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStorageController;
    use crate::StorageController;

    #[tokio::test]
    async fn test_unknown_scheme() {
        let client = UniversalClient::with_defaults(reqwest::Client::new());
        let url = Url::parse("ftp://example.com/segment.mp4").unwrap();

        let err = client.build_storage_claim_by_url(&url).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownClaimType(scheme) if scheme == "ftp"));
    }

    #[tokio::test]
    async fn test_dispatches_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path()).unwrap();
        let claim = controller.allocate_storage_claim("output_x").await.unwrap();

        let client = UniversalClient::with_defaults(reqwest::Client::new());
        let built = client.build_storage_claim_by_url(claim.url()).await.unwrap();

        assert_eq!(built.id(), "output_x");
        assert_eq!(built.size(), 0);
    }

    #[tokio::test]
    async fn test_local_copy_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path().join("claims")).unwrap();
        let client = UniversalClient::with_defaults(reqwest::Client::new());

        let source = dir.path().join("slice_0.mp4");
        tokio::fs::write(&source, b"0123456789").await.unwrap();

        let claim = controller.allocate_storage_claim("input_o_s_1").await.unwrap();
        client.move_file_to_storage_claim(&source, claim.as_ref()).await.unwrap();
        assert!(!source.exists());

        let claim = controller.build_storage_claim("input_o_s_1").await.unwrap();
        let copies = dir.path().join("copies");
        let copy = client.make_local_copy(claim.as_ref(), &copies).await.unwrap();
        assert_eq!(tokio::fs::read(&copy).await.unwrap(), b"0123456789");

        // second copy is reused rather than downloaded again
        let again = client.make_local_copy(claim.as_ref(), &copies).await.unwrap();
        assert_eq!(copy, again);

        client.remove_local_copy(&copy).await.unwrap();
        assert!(!copy.exists());
        client.remove_local_copy(&copy).await.unwrap();
    }

    #[test]
    fn test_claim_from_parts() {
        let client = UniversalClient::with_defaults(reqwest::Client::new());
        let url = Url::parse("https://s3.example.com/bucket/output_1?X-Amz-Signature=abc").unwrap();

        let claim = client.claim_from_parts("output_1", &url, 9).unwrap();
        assert_eq!(claim.id(), "output_1");
        assert_eq!(claim.size(), 9);
        assert_eq!(claim.url(), &url);
    }
}
