//! Conversion parameters carried opaquely by orders and segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Encoder settings passed through to the transcoding engine.
///
/// The dealer never interprets these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConvertParams {
    /// Target codec, e.g. `h264` or `hevc`
    #[serde(default)]
    pub video_codec: String,

    /// Hardware acceleration backend, e.g. `nvenc` or `videotoolbox`
    #[serde(default)]
    pub hw_accel: String,

    /// Target bit rate, e.g. `10M`
    #[serde(default)]
    pub video_bit_rate: String,

    /// Constant quality value (0 = encoder default)
    #[serde(default)]
    pub video_quality: u32,

    /// Encoder preset
    #[serde(default)]
    pub preset: String,

    /// Output scale, e.g. `1/2`
    #[serde(default)]
    pub scale: String,

    /// Keyframe interval in frames (0 = encoder default)
    #[serde(default)]
    pub keyframe_interval: u32,
}
