//! End-to-end engine tests against real ffmpeg binaries.

use std::path::Path;

use fftb_media::{FfmpegCommand, FfmpegEngine, FfmpegRunner, MediaConfig, MediaEngine, TranscodeRequest};
use fftb_models::{ConvertParams, ProgressStep};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn make_sample(dir: &Path, seconds: u32) -> std::path::PathBuf {
    let path = dir.join("sample.mp4");
    let cmd = FfmpegCommand::new(format!("testsrc=duration={}:size=320x240:rate=25", seconds), &path)
        .input_format("lavfi")
        .video_codec("libx264")
        .output_args(["-g", "25"]);

    FfmpegRunner::new("ffmpeg").run(&cmd).await.unwrap();
    path
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_slice_then_concat_keeps_duration() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FfmpegEngine::new(MediaConfig::from_env());
    let input = make_sample(dir.path(), 25).await;

    let slices = engine
        .slice(&input, &dir.path().join("slices"), 10, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(slices.len(), 3);
    assert_eq!(slices[0].position, 0);

    let output = dir.path().join("joined.mp4");
    engine
        .concat(&slices, &output, CancellationToken::new())
        .await
        .unwrap();

    let original = engine.get_metadata(&input).await.unwrap();
    let joined = engine.get_metadata(&output).await.unwrap();
    assert!((original.duration - joined.duration).abs() < 0.5);
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_transcode_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FfmpegEngine::new(MediaConfig::from_env());
    let input = make_sample(dir.path(), 3).await;
    let (tx, mut rx) = mpsc::channel(64);

    let request = TranscodeRequest {
        input,
        output: dir.path().join("out.mkv"),
        params: ConvertParams {
            video_codec: "h264".to_string(),
            video_quality: 30,
            preset: "ultrafast".to_string(),
            scale: "1/2".to_string(),
            ..Default::default()
        },
        muxer: "matroska".to_string(),
    };

    engine
        .transcode(request, tx, CancellationToken::new())
        .await
        .unwrap();

    let mut last = None;
    while let Ok(p) = rx.try_recv() {
        assert_eq!(p.step, ProgressStep::Processing);
        last = Some(p.percent);
    }
    assert_eq!(last, Some(1.0));

    let metadata = engine.get_metadata(&dir.path().join("out.mkv")).await.unwrap();
    assert_eq!(metadata.width, 160);
}
