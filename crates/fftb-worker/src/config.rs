//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use fftb_media::MediaConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the dealer API
    pub dealer_url: String,
    /// Authority key exchanged for sessions
    pub authority_key: String,
    /// Performer name used in logs
    pub name: String,
    /// Work directory for pulled inputs and converted outputs
    pub tmp_dir: PathBuf,
    /// Pause after the dealer had nothing to hand out
    pub free_segment_delay: Duration,
    /// Minimum gap between two progress reports of the same step
    pub notify_throttle: Duration,
    /// FFmpeg binaries
    pub media: MediaConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dealer_url: "http://localhost:8080".to_string(),
            authority_key: String::new(),
            name: "worker".to_string(),
            tmp_dir: std::env::temp_dir().join("fftb-worker"),
            free_segment_delay: Duration::from_millis(3000),
            notify_throttle: Duration::from_millis(2000),
            media: MediaConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            dealer_url: std::env::var("DEALER_URL").unwrap_or(defaults.dealer_url),
            authority_key: std::env::var("AUTHORITY_KEY").unwrap_or_default(),
            name: std::env::var("WORKER_NAME").unwrap_or(defaults.name),
            tmp_dir: std::env::var("WORKER_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_dir),
            free_segment_delay: Duration::from_millis(
                std::env::var("FREE_SEGMENT_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3000),
            ),
            notify_throttle: Duration::from_millis(
                std::env::var("NOTIFY_THROTTLE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            media: MediaConfig::from_env(),
        }
    }
}
