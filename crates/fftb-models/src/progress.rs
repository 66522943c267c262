//! Transient progress reports.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a segment's journey through a performer or publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    UploadingInput,
    DownloadingInput,
    Processing,
    UploadingOutput,
    DownloadingOutput,
}

impl ProgressStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStep::UploadingInput => "uploading_input",
            ProgressStep::DownloadingInput => "downloading_input",
            ProgressStep::Processing => "processing",
            ProgressStep::UploadingOutput => "uploading_output",
            ProgressStep::DownloadingOutput => "downloading_output",
        }
    }
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one step, `percent` in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Progress {
    pub step: ProgressStep,
    pub percent: f64,
}

impl Progress {
    /// Build a progress report, clamping `percent` into range.
    pub fn new(step: ProgressStep, percent: f64) -> Self {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 1.0)
        };

        Self { step, percent }
    }

    /// Progress from transferred and total byte counts.
    pub fn from_bytes(step: ProgressStep, done: u64, total: u64) -> Self {
        if total == 0 {
            return Self::new(step, 0.0);
        }

        Self::new(step, done as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(Progress::new(ProgressStep::Processing, 1.7).percent, 1.0);
        assert_eq!(Progress::new(ProgressStep::Processing, -3.0).percent, 0.0);
        assert_eq!(Progress::new(ProgressStep::Processing, f64::NAN).percent, 0.0);
    }

    #[test]
    fn test_from_bytes() {
        let p = Progress::from_bytes(ProgressStep::UploadingInput, 25, 100);
        assert!((p.percent - 0.25).abs() < f64::EPSILON);
        assert_eq!(Progress::from_bytes(ProgressStep::UploadingInput, 5, 0).percent, 0.0);
    }

    #[test]
    fn test_step_serialization() {
        let json = serde_json::to_string(&ProgressStep::DownloadingOutput).unwrap();
        assert_eq!(json, "\"downloading_output\"");
    }
}
