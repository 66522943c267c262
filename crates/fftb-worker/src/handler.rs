//! Convert one segment: pull the input, transcode, push the output.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fftb_dealer::SegmentPerformer;
use fftb_media::{MediaEngine, TranscodeRequest};
use fftb_models::{Author, DealerError, ErrorKind, Progress, ProgressStep, Segment};
use fftb_storage::{Counted, StorageClaim, TransferCounter};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::SegmentLogger;
use crate::retry::{retry_async, RetryConfig};
use crate::throttle::NotifyThrottle;

/// How often transfer progress is sampled.
const TRANSFER_TICK: Duration = Duration::from_millis(500);

/// How a handled segment was reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Failed,
    Quit,
}

/// Runs the pull/convert/push pipeline for segments locked by `performer`.
pub struct SegmentHandler {
    dealer: Arc<dyn SegmentPerformer>,
    engine: Arc<dyn MediaEngine>,
    performer: Author,
    tmp_dir: PathBuf,
    notify_interval: Duration,
    report_retry: RetryConfig,
}

impl SegmentHandler {
    pub fn new(
        dealer: Arc<dyn SegmentPerformer>,
        engine: Arc<dyn MediaEngine>,
        performer: Author,
        tmp_dir: impl Into<PathBuf>,
        notify_interval: Duration,
    ) -> Self {
        Self {
            dealer,
            engine,
            performer,
            tmp_dir: tmp_dir.into(),
            notify_interval,
            report_retry: RetryConfig::new("report_segment_outcome"),
        }
    }

    /// Convert `segment` and report the outcome to the dealer.
    ///
    /// Cancellation is reported as a quit so the segment keeps its retry
    /// budget. Local files are removed whatever the outcome.
    pub async fn handle(&self, segment: Segment, cancel: CancellationToken) -> WorkerResult<Outcome> {
        let logger = SegmentLogger::new(&segment, &self.performer);
        let span = logger.create_span();

        self.run(segment, cancel, logger).instrument(span).await
    }

    async fn run(&self, segment: Segment, cancel: CancellationToken, logger: SegmentLogger) -> WorkerResult<Outcome> {
        logger.log_start(segment.payload.muxer());

        let work_dir = self.tmp_dir.join(segment.id.as_str());
        let mut throttle = NotifyThrottle::new(self.notify_interval);

        let converted = self.convert(&segment, &work_dir, &cancel, &mut throttle).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                logger.log_warning(&format!("failed to remove {}: {}", work_dir.display(), e));
            }
        }

        let id = &segment.id;
        match converted {
            Ok(()) => {
                self.report(|dealer, performer| async move { dealer.finish_segment(performer, id).await })
                    .await?;
                logger.log_completion("finished");
                Ok(Outcome::Finished)
            }
            Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                logger.log_warning(&format!("{}, releasing segment", e));
                self.report(|dealer, performer| async move { dealer.quit_segment(performer, id).await })
                    .await?;
                Ok(Outcome::Quit)
            }
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&message);

                let message = message.as_str();
                self.report(|dealer, performer| async move {
                    dealer.fail_segment(performer, id, message).await
                })
                .await?;
                Ok(Outcome::Failed)
            }
        }
    }

    /// Deliver an outcome, retrying transport failures.
    async fn report<'a, F, Fut>(&'a self, call: F) -> WorkerResult<()>
    where
        F: Fn(&'a dyn SegmentPerformer, &'a Author) -> Fut,
        Fut: Future<Output = Result<(), DealerError>>,
    {
        let dealer = self.dealer.as_ref();
        let performer = &self.performer;

        retry_async(
            &self.report_retry,
            |e: &DealerError| e.kind() == ErrorKind::Unknown,
            || call(dealer, performer),
        )
        .await
        .map_err(WorkerError::from)
    }

    async fn convert(
        &self,
        segment: &Segment,
        work_dir: &Path,
        cancel: &CancellationToken,
        throttle: &mut NotifyThrottle,
    ) -> WorkerResult<()> {
        tokio::fs::create_dir_all(work_dir).await?;

        let muxer = segment.payload.muxer();
        let input = work_dir.join(format!("input.{}", muxer));
        let output = work_dir.join(format!("output.{}", muxer));

        let input_claim = self
            .dealer
            .get_input_storage_claim(&self.performer, &segment.id)
            .await?;
        self.pull(segment, input_claim.as_ref(), &input, cancel, throttle)
            .await?;

        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        self.transcode(segment, &input, &output, cancel, throttle).await?;

        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        let output_claim = self
            .dealer
            .allocate_output_storage_claim(&self.performer, &segment.id)
            .await?;
        self.push(segment, &output, output_claim.as_ref(), cancel, throttle)
            .await
    }

    async fn pull(
        &self,
        segment: &Segment,
        claim: &dyn StorageClaim,
        path: &Path,
        cancel: &CancellationToken,
        throttle: &mut NotifyThrottle,
    ) -> WorkerResult<()> {
        let counter = TransferCounter::new();
        let total = claim.size();

        let copy = async {
            let file = tokio::fs::File::create(path).await?;
            let mut writer = Counted::new(file, counter.clone());
            claim
                .read_to(&mut writer)
                .await
                .map_err(|e| WorkerError::pull_failed(e.to_string()))?;
            writer.flush().await?;
            Ok::<(), WorkerError>(())
        };

        self.track(segment, ProgressStep::DownloadingInput, &counter, total, copy, cancel, throttle)
            .await?;
        debug!(segment_id = %segment.id, bytes = counter.get(), "Pulled input");
        Ok(())
    }

    async fn transcode(
        &self,
        segment: &Segment,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
        throttle: &mut NotifyThrottle,
    ) -> WorkerResult<()> {
        let request = TranscodeRequest {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            params: segment.payload.params().clone(),
            muxer: segment.payload.muxer().to_string(),
        };

        let (tx, mut rx) = mpsc::channel(16);
        let run = self.engine.transcode(request, tx, cancel.clone());
        tokio::pin!(run);

        loop {
            tokio::select! {
                result = &mut run => {
                    result?;
                    self.notify(segment, Progress::new(ProgressStep::Processing, 1.0), throttle).await;
                    return Ok(());
                }
                _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
                Some(progress) = rx.recv() => {
                    self.notify(segment, progress, throttle).await;
                }
            }
        }
    }

    async fn push(
        &self,
        segment: &Segment,
        path: &Path,
        claim: &dyn StorageClaim,
        cancel: &CancellationToken,
        throttle: &mut NotifyThrottle,
    ) -> WorkerResult<()> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let counter = TransferCounter::new();
        let reader = Counted::new(file, counter.clone());

        let upload = async {
            claim
                .write_from(Box::new(reader), Some(length))
                .await
                .map_err(|e| WorkerError::push_failed(e.to_string()))?;
            Ok::<(), WorkerError>(())
        };

        self.track(segment, ProgressStep::UploadingOutput, &counter, length, upload, cancel, throttle)
            .await?;
        debug!(segment_id = %segment.id, bytes = length, "Pushed output");
        Ok(())
    }

    /// Drive a transfer, sampling `counter` for progress reports.
    ///
    /// Cancelling drops the transfer mid-stream.
    #[allow(clippy::too_many_arguments)]
    async fn track<F>(
        &self,
        segment: &Segment,
        step: ProgressStep,
        counter: &TransferCounter,
        total: u64,
        transfer: F,
        cancel: &CancellationToken,
        throttle: &mut NotifyThrottle,
    ) -> WorkerResult<()>
    where
        F: Future<Output = WorkerResult<()>>,
    {
        tokio::pin!(transfer);
        let mut ticker = tokio::time::interval(TRANSFER_TICK);

        loop {
            tokio::select! {
                result = &mut transfer => {
                    result?;
                    self.notify(segment, Progress::new(step, 1.0), throttle).await;
                    return Ok(());
                }
                _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
                _ = ticker.tick() => {
                    self.notify(segment, Progress::from_bytes(step, counter.get(), total), throttle).await;
                }
            }
        }
    }

    /// Report progress, renewing the lock. Failures are only logged.
    async fn notify(&self, segment: &Segment, progress: Progress, throttle: &mut NotifyThrottle) {
        if !throttle.should_send(&progress) {
            return;
        }

        let id = &segment.id;
        let result = match progress.step {
            ProgressStep::DownloadingInput => self.dealer.notify_raw_download(&self.performer, id, progress).await,
            ProgressStep::Processing => self.dealer.notify_process(&self.performer, id, progress).await,
            ProgressStep::UploadingOutput => self.dealer.notify_result_upload(&self.performer, id, progress).await,
            ProgressStep::UploadingInput | ProgressStep::DownloadingOutput => return,
        };

        if let Err(e) = result {
            warn!(segment_id = %id, step = %progress.step, error = %e, "Progress notification failed");
        }
    }
}
