//! Segment performer for the fftb job dealer.
//!
//! This crate provides:
//! - The poll loop asking the dealer for free segments
//! - The pull/convert/push handler with cancellation
//! - Throttled progress reporting that doubles as lock renewal
//! - Backoff and log suppression helpers

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod retry;
pub mod throttle;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use handler::{Outcome, SegmentHandler};
pub use logging::SegmentLogger;
pub use retry::{retry_async, FailureTracker, RetryConfig};
pub use throttle::NotifyThrottle;
pub use worker::{Poll, Worker};
