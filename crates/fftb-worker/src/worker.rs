//! Poll loop: one segment at a time until cancelled.

use std::sync::Arc;
use std::time::Duration;

use fftb_dealer::SegmentPerformer;
use fftb_models::{Author, ErrorKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::WorkerResult;
use crate::handler::{Outcome, SegmentHandler};
use crate::retry::{FailureTracker, RetryConfig};

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// A segment was handled and reported
    Handled(Outcome),
    /// The dealer had nothing actionable
    Idle,
    /// The dealer's selection window was busy
    Contended,
}

/// Performer loop around a [`SegmentHandler`].
pub struct Worker {
    dealer: Arc<dyn SegmentPerformer>,
    handler: SegmentHandler,
    performer: Author,
    free_segment_delay: Duration,
    backoff: RetryConfig,
}

impl Worker {
    pub fn new(
        dealer: Arc<dyn SegmentPerformer>,
        handler: SegmentHandler,
        performer: Author,
        free_segment_delay: Duration,
    ) -> Self {
        Self {
            dealer,
            handler,
            performer,
            free_segment_delay,
            backoff: RetryConfig::new("find_free_segment")
                .with_base_delay(Duration::from_millis(250))
                .with_max_delay(Duration::from_secs(10)),
        }
    }

    /// Ask for one segment and handle it.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> WorkerResult<Poll> {
        let segment = match self.dealer.find_free_segment(&self.performer).await {
            Ok(segment) => segment,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Poll::Idle),
            Err(e) if e.kind() == ErrorKind::LockTimeout => return Ok(Poll::Contended),
            Err(e) => return Err(e.into()),
        };

        debug!(segment_id = %segment.id, "Got segment");
        let outcome = self.handler.handle(segment, cancel.child_token()).await?;
        Ok(Poll::Handled(outcome))
    }

    /// Poll until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(performer = %self.performer, "Worker started");

        let mut contended = 0u32;
        let mut failures = FailureTracker::new(3);

        while !cancel.is_cancelled() {
            let pause = match self.poll_once(&cancel).await {
                Ok(Poll::Handled(outcome)) => {
                    debug!(?outcome, "Segment handled");
                    contended = 0;
                    failures.record_success();
                    Duration::ZERO
                }
                Ok(Poll::Idle) => {
                    contended = 0;
                    failures.record_success();
                    self.free_segment_delay
                }
                Ok(Poll::Contended) => {
                    contended += 1;
                    let delay = self.backoff.delay_for_attempt(contended);
                    debug!(attempt = contended, delay_ms = delay.as_millis() as u64, "Dealer busy, backing off");
                    delay
                }
                Err(e) => {
                    if failures.record_failure() {
                        error!(error = %e, "Worker poll failed");
                    }
                    self.free_segment_delay
                }
            };

            if pause.is_zero() {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        warn!(performer = %self.performer, "Worker stopped");
    }
}
