//! Storage claims for the fftb dealer.
//!
//! This crate provides:
//! - The `StorageClaim` / `StorageController` contracts
//! - A local filesystem backend (`file://` claims)
//! - An S3-compatible backend handing out presigned `https://` claims
//! - A universal client dispatching claim URLs by scheme
//! - Byte counting wrappers for transfer progress

pub mod claim;
pub mod client;
pub mod error;
pub mod http;
pub mod local;
pub mod s3;
pub mod transfer;

pub use claim::{download_file, upload_file, ClaimReader, StorageClaim, StorageController};
pub use client::{HttpStorageClient, LocalStorageClient, StorageClient, UniversalClient};
pub use error::{StorageError, StorageResult};
pub use http::HttpStorageClaim;
pub use local::{LocalStorageClaim, LocalStorageController};
pub use s3::{S3Config, S3StorageController};
pub use transfer::{Counted, TransferCounter};
