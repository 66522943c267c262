//! Conversion parameters to FFmpeg arguments.

use fftb_models::ConvertParams;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Apply `params` and the output `muxer` to `cmd`.
///
/// An empty codec keeps the video stream as is.
pub fn apply_convert_params(
    mut cmd: FfmpegCommand,
    params: &ConvertParams,
    muxer: &str,
) -> MediaResult<FfmpegCommand> {
    let hw_accel = params.hw_accel.as_str();

    if hw_accel == "nvenc" {
        cmd = cmd.input_arg("-hwaccel").input_arg("cuda");
    }

    match encoder_name(&params.video_codec, hw_accel)? {
        None => {
            cmd = cmd.video_codec("copy");
        }
        Some(encoder) => {
            cmd = cmd.video_codec(encoder);

            if params.video_quality > 0 {
                let quality = params.video_quality.to_string();
                cmd = match hw_accel {
                    "nvenc" => cmd.output_args(["-rc", "constqp", "-qp", quality.as_str()]),
                    "videotoolbox" => cmd.output_args(["-q:v", quality.as_str()]),
                    _ => cmd.output_args(["-crf", quality.as_str()]),
                };
            } else if !params.video_bit_rate.is_empty() {
                cmd = cmd.output_args(["-b:v", params.video_bit_rate.as_str()]);
            }

            if !params.preset.is_empty() && hw_accel != "videotoolbox" {
                cmd = cmd.output_args(["-preset", params.preset.as_str()]);
            }

            if let Some(filter) = scale_filter(&params.scale)? {
                cmd = cmd.video_filter(filter);
            }

            if params.keyframe_interval > 0 {
                cmd = cmd.output_args(["-g".to_string(), params.keyframe_interval.to_string()]);
            }
        }
    }

    cmd = cmd.audio_codec("copy");

    if !muxer.is_empty() {
        cmd = cmd.output_format(muxer);
    }

    Ok(cmd)
}

fn encoder_name(codec: &str, hw_accel: &str) -> MediaResult<Option<&'static str>> {
    let encoder = match (codec, hw_accel) {
        ("", _) | ("copy", _) => return Ok(None),
        ("h264", "") => "libx264",
        ("hevc", "") => "libx265",
        ("h264", "nvenc") => "h264_nvenc",
        ("hevc", "nvenc") => "hevc_nvenc",
        ("h264", "videotoolbox") => "h264_videotoolbox",
        ("hevc", "videotoolbox") => "hevc_videotoolbox",
        (_, "") | (_, "nvenc") | (_, "videotoolbox") => {
            return Err(MediaError::unsupported("video_codec", codec))
        }
        _ => return Err(MediaError::unsupported("hw_accel", hw_accel)),
    };

    Ok(Some(encoder))
}

fn scale_filter(scale: &str) -> MediaResult<Option<&'static str>> {
    match scale {
        "" => Ok(None),
        "1/2" => Ok(Some("scale=iw/2:-2")),
        "1/4" => Ok(Some("scale=iw/4:-2")),
        other => Err(MediaError::unsupported("scale", other)),
    }
}
