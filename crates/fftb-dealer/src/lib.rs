//! Segment dealer for the fftb media pipeline.
//!
//! This crate provides:
//! - Dealer traits split by caller role
//! - An in-process dealer over the registry and a storage controller
//! - An HTTP client for a remote dealer
//! - The contracter that turns orders into segments and back into files

pub mod config;
pub mod contracter;
pub mod dealer;
pub mod local;
pub mod metrics;
pub mod remote;
pub mod workers;

pub use config::{ContracterConfig, DEFAULT_FILES_ROOT, MAX_QUEUED_SEGMENTS_FOR_NEXT_ORDER};
pub use contracter::Contracter;
pub use dealer::{AuthorityIssuer, Dealer, SegmentPerformer, SegmentPublisher};
pub use local::{LocalDealer, FREE_SEGMENT_LOCK_TIMEOUT};
pub use remote::RemoteDealer;
pub use workers::{concat_tick, publish_tick, spawn_concat_worker, spawn_publish_worker, Tick};
