//! Local filesystem backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::claim::{check_claim_id, ClaimReader, StorageClaim, StorageController};
use crate::error::{StorageError, StorageResult};

/// Claim backed by a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorageClaim {
    id: String,
    name: String,
    path: PathBuf,
    url: Url,
    size: u64,
}

impl LocalStorageClaim {
    /// Handle for an existing or freshly created file at `path`.
    pub fn new(id: impl Into<String>, path: PathBuf, size: u64) -> StorageResult<Self> {
        let url = Url::from_file_path(&path)
            .map_err(|_| StorageError::InvalidUrl(path.display().to_string()))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            id: id.into(),
            name,
            path,
            url,
            size,
        })
    }

    /// Resolve a `file://` URL to a claim, failing `MissingFile` if absent.
    pub async fn from_url(url: &Url) -> StorageResult<Self> {
        let path = url
            .to_file_path()
            .map_err(|_| StorageError::InvalidUrl(url.to_string()))?;

        let size = file_size(&path).await?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;

        Self::new(id, path, size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageClaim for LocalStorageClaim {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn write_from(&self, mut reader: ClaimReader, _length: Option<u64>) -> StorageResult<u64> {
        let mut file = fs::File::create(&self.path).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;

        debug!(claim_id = %self.id, bytes = written, "Wrote local storage claim");
        Ok(written)
    }

    async fn read_to(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> StorageResult<u64> {
        let mut file = fs::File::open(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::missing_file(&self.id)
            } else {
                StorageError::Io(e)
            }
        })?;

        let read = tokio::io::copy(&mut file, &mut *writer).await?;
        writer.flush().await?;

        Ok(read)
    }
}

/// Controller keeping every claim as a file under one directory.
#[derive(Debug, Clone)]
pub struct LocalStorageController {
    base_path: PathBuf,
}

impl LocalStorageController {
    /// Create a controller rooted at `base_path`; relative paths resolve
    /// against the current directory.
    pub fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        let base_path = if base_path.is_absolute() {
            base_path
        } else {
            std::env::current_dir()?.join(base_path)
        };

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn claim_path(&self, id: &str) -> StorageResult<PathBuf> {
        check_claim_id(id)?;
        Ok(self.base_path.join(id))
    }
}

#[async_trait]
impl StorageController for LocalStorageController {
    async fn allocate_storage_claim(&self, id: &str) -> StorageResult<Box<dyn StorageClaim>> {
        let path = self.claim_path(id)?;
        fs::create_dir_all(&self.base_path).await?;

        // create_new makes the existence check and creation one atomic step
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StorageError::already_allocated(id)
                } else {
                    StorageError::Io(e)
                }
            })?;

        debug!(claim_id = %id, path = %path.display(), "Allocated local storage claim");
        Ok(Box::new(LocalStorageClaim::new(id, path, 0)?))
    }

    async fn build_storage_claim(&self, id: &str) -> StorageResult<Box<dyn StorageClaim>> {
        let path = self.claim_path(id)?;
        let size = file_size(&path).await?;

        Ok(Box::new(LocalStorageClaim::new(id, path, size)?))
    }

    async fn purge_storage_claim(&self, id: &str) -> StorageResult<()> {
        let path = self.claim_path(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(claim_id = %id, "Purged local storage claim");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", id, e))),
        }
    }
}

async fn file_size(path: &Path) -> StorageResult<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(StorageError::missing_file(path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StorageError::missing_file(path.display().to_string()))
        }
        Err(e) => Err(StorageError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{download_file, upload_file};

    #[tokio::test]
    async fn test_allocate_twice_fails_already_allocated() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path()).unwrap();

        controller.allocate_storage_claim("input_a").await.unwrap();
        let err = controller.allocate_storage_claim("input_a").await.unwrap_err();

        assert!(matches!(err, StorageError::AlreadyAllocated(id) if id == "input_a"));
    }

    #[tokio::test]
    async fn test_build_missing_claim() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path()).unwrap();

        let err = controller.build_storage_claim("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::MissingFile(_)));
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path().join("claims")).unwrap();

        let claim = controller.allocate_storage_claim("output_1").await.unwrap();
        assert_eq!(claim.url().scheme(), "file");

        let source = dir.path().join("source.bin");
        tokio::fs::write(&source, b"segment bytes").await.unwrap();
        assert_eq!(upload_file(claim.as_ref(), &source).await.unwrap(), 13);

        let built = controller.build_storage_claim("output_1").await.unwrap();
        assert_eq!(built.size(), 13);

        let target = dir.path().join("copy/target.bin");
        download_file(built.as_ref(), &target).await.unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"segment bytes");
    }

    #[tokio::test]
    async fn test_purge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path()).unwrap();

        controller.allocate_storage_claim("input_b").await.unwrap();
        controller.purge_storage_claim("input_b").await.unwrap();
        controller.purge_storage_claim("input_b").await.unwrap();

        assert!(controller.build_storage_claim("input_b").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let controller = LocalStorageController::new(dir.path()).unwrap();

        let err = controller.allocate_storage_claim("../escape").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
    }
}
