//! State transitions for segments and orders.
//!
//! Nothing outside this module assigns `state`, lock or retry fields. Every
//! transition takes the current time explicitly so the rules stay pure.

use chrono::{DateTime, Utc};

use crate::segment::{
    next_retry_offset, segment_lock_duration, CANCELLATION_REASON_FAILED,
    CANCELLATION_REASON_ORDER_CANCELLED, MAX_RETRIES_COUNT,
};
use crate::{
    Author, DealerError, DealerResult, Order, OrderState, Segment, SegmentId, SegmentState,
    ValidationError,
};

fn invalid_transition(from: &str, to: &str) -> DealerError {
    let mut validation = ValidationError::new();
    validation.add("state", format!("cannot transition from {} to {}", from, to));
    validation.into()
}

impl Segment {
    /// Fail with `PerformerMismatch` unless `performer` holds (or last held) the lock.
    pub fn ensure_performer(&self, performer: &Author) -> DealerResult<()> {
        match &self.locked_by {
            Some(holder) if holder == performer => Ok(()),
            Some(holder) => Err(DealerError::performer_mismatch(format!(
                "segment {} is locked by {}, not {}",
                self.id, holder, performer
            ))),
            None => Err(DealerError::performer_mismatch(format!(
                "segment {} is not locked by {}",
                self.id, performer
            ))),
        }
    }

    /// Fail with `PublisherMismatch` unless `publisher` owns the segment.
    pub fn ensure_publisher(&self, publisher: &Author) -> DealerResult<()> {
        if &self.publisher == publisher {
            Ok(())
        } else {
            Err(DealerError::publisher_mismatch(format!(
                "segment {} belongs to {}, not {}",
                self.id, self.publisher, publisher
            )))
        }
    }

    /// Lock to `performer` for a fresh lock period.
    ///
    /// Relocking by the current holder renews the deadline. A published
    /// segment becomes accepted on its first lock.
    pub fn lock(&mut self, performer: &Author, now: DateTime<Utc>) -> DealerResult<()> {
        if performer.is_empty() {
            return Err(DealerError::MissingLockAuthor);
        }

        if self.is_locked(now) && !self.is_locked_by(performer, now) {
            return Err(DealerError::SegmentIsLocked(self.id.to_string()));
        }

        self.locked_by = Some(performer.clone());
        self.locked_until = Some(now + segment_lock_duration());

        if self.state == SegmentState::Published {
            self.state = SegmentState::Accepted;
        }

        Ok(())
    }

    /// Release the lock without touching retry bookkeeping.
    pub fn unlock(&mut self) {
        self.locked_by = None;
        self.locked_until = None;
    }

    /// `prepared → published`.
    pub fn publish(&mut self) -> DealerResult<()> {
        if self.state != SegmentState::Prepared {
            return Err(invalid_transition(self.state.as_str(), "published"));
        }

        self.state = SegmentState::Published;
        self.unlock();
        Ok(())
    }

    /// Any non-terminal state → `finished`.
    pub fn finish(&mut self) -> DealerResult<()> {
        if self.state.is_terminal() {
            return Err(invalid_transition(self.state.as_str(), "finished"));
        }

        self.state = SegmentState::Finished;
        self.unlock();
        Ok(())
    }

    /// Any non-terminal state → `cancelled`.
    ///
    /// Returns `false` when the segment was already cancelled.
    pub fn cancel(&mut self, reason: &str) -> DealerResult<bool> {
        match self.state {
            SegmentState::Cancelled => Ok(false),
            SegmentState::Finished => Err(invalid_transition("finished", "cancelled")),
            _ => {
                self.state = SegmentState::Cancelled;
                self.cancellation_reason = Some(reason.to_string());
                self.unlock();
                Ok(true)
            }
        }
    }

    /// `cancelled → published` with a fresh retry budget.
    pub fn republish(&mut self) -> DealerResult<()> {
        if self.state != SegmentState::Cancelled {
            return Err(invalid_transition(self.state.as_str(), "published"));
        }

        self.state = SegmentState::Published;
        self.cancellation_reason = None;
        self.retries_count = 0;
        self.retry_at = None;
        self.last_error = None;
        self.unlock();
        Ok(())
    }

    /// Apply the retry policy after a failed attempt.
    ///
    /// Returns `true` when the retry cap was reached and the segment is now
    /// cancelled.
    pub fn fail(&mut self, error: &str, now: DateTime<Utc>) -> DealerResult<bool> {
        if self.state.is_terminal() {
            return Err(invalid_transition(self.state.as_str(), "failed"));
        }

        self.last_error = Some(error.to_string());
        self.retries_count += 1;
        self.retry_at = Some(now + next_retry_offset());
        self.unlock();

        if self.retries_count >= MAX_RETRIES_COUNT {
            self.cancel(CANCELLATION_REASON_FAILED)?;
            return Ok(true);
        }

        Ok(false)
    }
}

impl Order {
    /// Fail with `PublisherMismatch` unless `publisher` owns the order.
    pub fn ensure_publisher(&self, publisher: &Author) -> DealerResult<()> {
        if &self.publisher == publisher {
            Ok(())
        } else {
            Err(DealerError::publisher_mismatch(format!(
                "order {} belongs to {}, not {}",
                self.id, self.publisher, publisher
            )))
        }
    }

    /// `queued → in_progress`, recording the published segments.
    pub fn publish(&mut self, segment_ids: Vec<SegmentId>) -> DealerResult<()> {
        if self.state != OrderState::Queued {
            return Err(invalid_transition(self.state.as_str(), "in_progress"));
        }

        self.state = OrderState::InProgress;
        self.segment_ids = segment_ids;
        Ok(())
    }

    /// `in_progress → finished`, only once every segment is finished.
    pub fn finish(&mut self, segments: &[Segment]) -> DealerResult<()> {
        if self.state != OrderState::InProgress {
            return Err(invalid_transition(self.state.as_str(), "finished"));
        }

        if let Some(pending) = segments.iter().find(|s| s.state != SegmentState::Finished) {
            let mut validation = ValidationError::new();
            validation.add(
                "segment_ids",
                format!("segment {} is {}, not finished", pending.id, pending.state),
            );
            return Err(validation.into());
        }

        self.state = OrderState::Finished;
        Ok(())
    }

    /// Cancel the order and every still-active segment.
    ///
    /// Returns ids of the segments that changed. An already cancelled order
    /// keeps its first reason.
    pub fn cancel(&mut self, reason: &str, segments: &mut [Segment]) -> DealerResult<Vec<SegmentId>> {
        match self.state {
            OrderState::Finished => return Err(invalid_transition("finished", "cancelled")),
            OrderState::Cancelled => return Ok(Vec::new()),
            _ => {}
        }

        self.state = OrderState::Cancelled;
        self.cancellation_reason = Some(reason.to_string());

        let mut touched = Vec::new();
        for segment in segments.iter_mut().filter(|s| !s.state.is_terminal()) {
            if segment.cancel(CANCELLATION_REASON_ORDER_CANCELLED)? {
                touched.push(segment.id.clone());
            }
        }

        Ok(touched)
    }

    /// Apply the retry policy after a failed publish or concat attempt.
    ///
    /// Returns ids of segments cancelled by the cascade; empty while retries
    /// remain.
    pub fn fail(
        &mut self,
        error: &str,
        segments: &mut [Segment],
        now: DateTime<Utc>,
    ) -> DealerResult<Vec<SegmentId>> {
        if self.state.is_terminal() {
            return Err(invalid_transition(self.state.as_str(), "failed"));
        }

        self.last_error = Some(error.to_string());
        self.retries_count += 1;
        self.retry_at = Some(now + next_retry_offset());

        if self.retries_count >= MAX_RETRIES_COUNT {
            return self.cancel(CANCELLATION_REASON_FAILED, segments);
        }

        Ok(Vec::new())
    }
}
