//! Contracter configuration.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Ceiling of queued segments above which no new order is published.
pub const MAX_QUEUED_SEGMENTS_FOR_NEXT_ORDER: usize = 15;

/// Default directory order files are read from and written to.
pub const DEFAULT_FILES_ROOT: &str = "/var/lib/fftb/files";

/// Contracter configuration.
#[derive(Debug, Clone)]
pub struct ContracterConfig {
    /// Order input and output files must lie under this directory
    pub files_root: PathBuf,
    /// Scratch space for slices and downloaded outputs
    pub tmp_dir: PathBuf,
    /// Tick of the publish and concat workers
    pub poll_interval: Duration,
    /// Bounded admission for the publish worker
    pub max_queued_segments: usize,
    /// Length of one slice in seconds
    pub segment_duration_secs: u32,
}

impl Default for ContracterConfig {
    fn default() -> Self {
        Self {
            files_root: PathBuf::from(DEFAULT_FILES_ROOT),
            tmp_dir: std::env::temp_dir().join("fftb-contracter"),
            poll_interval: Duration::from_secs(5),
            max_queued_segments: MAX_QUEUED_SEGMENTS_FOR_NEXT_ORDER,
            segment_duration_secs: 10,
        }
    }
}

impl ContracterConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            files_root: std::env::var("CONTRACTER_FILES_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.files_root),
            tmp_dir: std::env::var("CONTRACTER_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_dir),
            poll_interval: Duration::from_secs(
                std::env::var("CONTRACTER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_queued_segments: std::env::var("CONTRACTER_MAX_QUEUED_SEGMENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_queued_segments),
            segment_duration_secs: std::env::var("CONTRACTER_SEGMENT_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.segment_duration_secs),
        }
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    pub fn with_files_root(mut self, files_root: impl Into<PathBuf>) -> Self {
        self.files_root = files_root.into();
        self
    }

    /// Resolve an order file path under [`files_root`](Self::files_root).
    ///
    /// Relative paths are joined onto the root, absolute ones must already
    /// lie beneath it. Any `..` component is refused outright. The check is
    /// lexical; symlinks inside the root are trusted.
    pub fn resolve_file(&self, raw: &str) -> Option<PathBuf> {
        let path = Path::new(raw);
        if raw.is_empty() || path.components().any(|c| c == Component::ParentDir) {
            return None;
        }

        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.files_root.join(path)
        };

        (resolved.starts_with(&self.files_root) && resolved != self.files_root).then_some(resolved)
    }
}
