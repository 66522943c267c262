//! Durable registry for the fftb job dealer.
//!
//! This crate provides:
//! - A minimal key/value store contract with glob search and expiry
//! - A single-file JSON store with periodic flush and prune
//! - A Redis store for shared deployments
//! - A typed registry of segments and orders on top of either

pub mod error;
pub mod file_store;
pub mod redis_store;
pub mod registry;
pub mod store;

pub use error::{RegistryError, RegistryResult};
pub use file_store::{FileStore, FileStoreConfig};
pub use redis_store::RedisStore;
pub use registry::{order_key, segment_key, Registry, ORDERS_PREFIX, SEGMENTS_PREFIX};
pub use store::{pattern_matches, KvStore};
