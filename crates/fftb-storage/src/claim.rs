//! Storage claim and controller contracts.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use fftb_models::StorageClaimResponse;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use crate::error::StorageResult;

/// Owned byte source streamed into a claim.
pub type ClaimReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Opaque handle to a blob, independent of the backend holding it.
#[async_trait]
pub trait StorageClaim: Send + Sync + fmt::Debug {
    /// Claim identity, unique within its controller.
    fn id(&self) -> &str;

    /// File name used for local copies.
    fn name(&self) -> &str;

    /// Locator the universal client can resolve again.
    fn url(&self) -> &Url;

    /// Size in bytes known when the handle was built.
    fn size(&self) -> u64;

    /// Replace the blob content with everything `reader` yields.
    ///
    /// `length`, when known, lets remote backends send a sized upload.
    async fn write_from(&self, reader: ClaimReader, length: Option<u64>) -> StorageResult<u64>;

    /// Stream the blob content into `writer`.
    async fn read_to(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> StorageResult<u64>;

    fn to_response(&self) -> StorageClaimResponse {
        StorageClaimResponse {
            id: self.id().to_string(),
            url: self.url().to_string(),
            size: self.size(),
        }
    }
}

/// Upload a local file into `claim`.
pub async fn upload_file(claim: &dyn StorageClaim, path: &Path) -> StorageResult<u64> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    claim.write_from(Box::new(file), Some(length)).await
}

/// Download `claim` into a local file, replacing it.
pub async fn download_file(claim: &dyn StorageClaim, path: &Path) -> StorageResult<u64> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(path).await?;
    let written = claim.read_to(&mut file).await?;
    tokio::io::AsyncWriteExt::flush(&mut file).await?;

    Ok(written)
}

/// Allocates, resolves and purges claims of one backend.
#[async_trait]
pub trait StorageController: Send + Sync {
    /// Create a new, empty claim. Fails `AlreadyAllocated` if `id` exists.
    async fn allocate_storage_claim(&self, id: &str) -> StorageResult<Box<dyn StorageClaim>>;

    /// Resolve an existing claim. Fails `MissingFile` if `id` is absent.
    async fn build_storage_claim(&self, id: &str) -> StorageResult<Box<dyn StorageClaim>>;

    /// Remove the blob behind `id`. Purging a missing claim is not an error.
    async fn purge_storage_claim(&self, id: &str) -> StorageResult<()>;
}

/// Reject ids that could escape the storage namespace.
pub(crate) fn check_claim_id(id: &str) -> StorageResult<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(crate::StorageError::InvalidId(id.to_string()));
    }

    Ok(())
}
