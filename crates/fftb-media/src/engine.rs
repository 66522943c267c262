//! Transcoding engine contract and its FFmpeg implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fftb_models::{ConvertParams, Progress, ProgressStep};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{resolve_binary, FfmpegCommand, FfmpegRunner};
use crate::convert::apply_convert_params;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaMetadata};
use crate::segments::{collect_slices, concat_command, concat_list, slice_command, SliceFile};

/// One transcode job.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: ConvertParams,
    pub muxer: String,
}

/// External media engine.
///
/// Every long-running operation honors `cancel` by killing the underlying
/// process and returning [`MediaError::Cancelled`].
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn get_metadata(&self, path: &Path) -> MediaResult<MediaMetadata>;

    /// Transcode, reporting `processing` progress on `progress`.
    async fn transcode(
        &self,
        request: TranscodeRequest,
        progress: mpsc::Sender<Progress>,
        cancel: CancellationToken,
    ) -> MediaResult<()>;

    /// Cut `input` into pieces of `segment_secs` inside `out_dir`.
    ///
    /// The pieces cover the whole input with no gaps or overlaps.
    async fn slice(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u32,
        cancel: CancellationToken,
    ) -> MediaResult<Vec<SliceFile>>;

    /// Join `slices` by position into `output`.
    async fn concat(
        &self,
        slices: &[SliceFile],
        output: &Path,
        cancel: CancellationToken,
    ) -> MediaResult<()>;
}

/// Location of the FFmpeg binaries.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl MediaConfig {
    /// Create from `FFMPEG_PATH` / `FFPROBE_PATH`, falling back to `PATH` lookup.
    pub fn from_env() -> Self {
        let lookup = |var: &str, name: &str| {
            std::env::var(var)
                .ok()
                .map(PathBuf::from)
                .or_else(|| resolve_binary(name))
                .unwrap_or_else(|| PathBuf::from(name))
        };

        Self {
            ffmpeg_path: lookup("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: lookup("FFPROBE_PATH", "ffprobe"),
        }
    }
}

/// [`MediaEngine`] backed by the ffmpeg and ffprobe command line tools.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    config: MediaConfig,
}

impl FfmpegEngine {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Both binaries can be found.
    pub fn check(&self) -> MediaResult<()> {
        which::which(&self.config.ffmpeg_path)
            .map_err(|_| MediaError::FfmpegNotFound(self.config.ffmpeg_path.display().to_string()))?;
        which::which(&self.config.ffprobe_path)
            .map_err(|_| MediaError::FfprobeNotFound(self.config.ffprobe_path.display().to_string()))?;
        Ok(())
    }

    fn runner(&self, cancel: CancellationToken) -> FfmpegRunner {
        FfmpegRunner::new(&self.config.ffmpeg_path).with_cancel(cancel)
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn get_metadata(&self, path: &Path) -> MediaResult<MediaMetadata> {
        probe_media(&self.config.ffprobe_path, path).await
    }

    async fn transcode(
        &self,
        request: TranscodeRequest,
        progress: mpsc::Sender<Progress>,
        cancel: CancellationToken,
    ) -> MediaResult<()> {
        let metadata = self.get_metadata(&request.input).await?;
        let total_ms = metadata.duration_ms();

        let cmd = apply_convert_params(
            FfmpegCommand::new(&request.input, &request.output),
            &request.params,
            &request.muxer,
        )?;

        info!(
            input = %request.input.display(),
            output = %request.output.display(),
            codec = %request.params.video_codec,
            "Transcoding"
        );

        self.runner(cancel)
            .run_with_progress(&cmd, move |p| {
                // Never block the stderr reader
                let _ = progress.try_send(Progress::new(ProgressStep::Processing, p.fraction(total_ms)));
            })
            .await
    }

    async fn slice(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u32,
        cancel: CancellationToken,
    ) -> MediaResult<Vec<SliceFile>> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        tokio::fs::create_dir_all(out_dir).await?;

        let cmd = slice_command(input, out_dir, segment_secs);
        self.runner(cancel).run(&cmd).await?;

        let slices = collect_slices(out_dir).await?;
        debug!(input = %input.display(), count = slices.len(), "Sliced input");

        if slices.is_empty() {
            return Err(MediaError::InvalidVideo(format!(
                "slicing {} produced no pieces",
                input.display()
            )));
        }

        Ok(slices)
    }

    async fn concat(
        &self,
        slices: &[SliceFile],
        output: &Path,
        cancel: CancellationToken,
    ) -> MediaResult<()> {
        let list = concat_list(slices)?;

        let list_dir = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("_fftb_concat_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&list_dir).await?;

        let list_file = list_dir.join("segments.txt");
        tokio::fs::write(&list_file, list).await?;

        let result = self.runner(cancel).run(&concat_command(&list_file, output)).await;

        if let Err(e) = tokio::fs::remove_dir_all(&list_dir).await {
            debug!(path = %list_dir.display(), error = %e, "Failed to remove concat list dir");
        }

        result
    }
}
