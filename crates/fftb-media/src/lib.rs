//! FFmpeg CLI wrapper for the fftb job dealer.
//!
//! This crate provides:
//! - The `MediaEngine` contract used by performers and publishers
//! - An FFmpeg command builder and runner with progress and cancellation
//! - FFprobe metadata
//! - Slicing into fixed-duration pieces and concatenation by position

pub mod command;
pub mod convert;
pub mod engine;
pub mod error;
pub mod probe;
pub mod progress;
pub mod segments;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use engine::{FfmpegEngine, MediaConfig, MediaEngine, TranscodeRequest};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_media, MediaMetadata};
pub use progress::FfmpegProgress;
pub use segments::{SliceFile, SLICE_PREFIX};
