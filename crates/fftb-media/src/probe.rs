//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels (0 when there is no video stream)
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Codec of the first video stream
    pub video_codec: String,
    /// File size in bytes
    pub size: u64,
    /// Bitrate in bits/second
    pub bitrate: u64,
}

impl MediaMetadata {
    pub fn has_video(&self) -> bool {
        !self.video_codec.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.duration * 1000.0) as i64
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file with the given ffprobe binary.
pub async fn probe_media(ffprobe: &Path, path: &Path) -> MediaResult<MediaMetadata> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::FfprobeNotFound(ffprobe.display().to_string()),
            _ => MediaError::Io(e),
        })?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let parse_u64 = |v: &Option<String>| v.as_ref().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let mut metadata = MediaMetadata {
        duration,
        size: parse_u64(&probe.format.size),
        bitrate: parse_u64(&probe.format.bit_rate),
        ..Default::default()
    };

    if let Some(video) = probe.streams.iter().find(|s| s.codec_type == "video") {
        metadata.width = video.width.unwrap_or(0);
        metadata.height = video.height.unwrap_or(0);
        metadata.video_codec = video.codec_name.clone().unwrap_or_default();
        metadata.fps = video
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(0.0);
    }

    if metadata.duration <= 0.0 && !metadata.has_video() {
        return Err(MediaError::InvalidVideo("no duration and no video stream".to_string()));
    }

    Ok(metadata)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0).then(|| num / den);
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "format": {"duration": "62.500", "size": "1048576", "bit_rate": "134217"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}
            ]
        }"#;

        let metadata = parse_probe_output(json).unwrap();
        assert_eq!(metadata.video_codec, "h264");
        assert_eq!(metadata.width, 1920);
        assert_eq!(metadata.size, 1_048_576);
        assert_eq!(metadata.duration_ms(), 62_500);
        assert!((metadata.fps - 25.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_media(Path::new("ffprobe"), Path::new("/nonexistent/file.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
