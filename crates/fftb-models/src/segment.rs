//! Segment: one independently transcodable slice of an order.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Author, OrderId, SegmentId, SegmentPayload, ValidationError};

/// How long a performer keeps a segment after locking or notifying, in seconds.
pub const SEGMENT_LOCK_DURATION_SECS: i64 = 60;

/// Failures tolerated before an entity is cancelled.
pub const MAX_RETRIES_COUNT: u32 = 3;

/// Delay before a failed entity becomes eligible again, in seconds.
pub const NEXT_RETRY_OFFSET_SECS: i64 = 300;

pub fn segment_lock_duration() -> Duration {
    Duration::seconds(SEGMENT_LOCK_DURATION_SECS)
}

pub fn next_retry_offset() -> Duration {
    Duration::seconds(NEXT_RETRY_OFFSET_SECS)
}

/// Cancellation reason used when the retry cap is reached.
pub const CANCELLATION_REASON_FAILED: &str = "Failed";

/// Cancellation reason applied to segments of a cancelled order.
pub const CANCELLATION_REASON_ORDER_CANCELLED: &str = "OrderCancelled";

/// Cancellation reason for explicit cancel requests.
pub const CANCELLATION_REASON_CANCELLED: &str = "Cancelled";

/// Persisted segment state.
///
/// "Locked" is not a state: it is derived from `locked_by` and
/// `locked_until` at read time, see [`Segment::is_locked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    /// Allocated, input bytes not uploaded yet
    #[default]
    Prepared,
    /// Input uploaded, waiting for a performer
    Published,
    /// Handed to a performer at least once
    Accepted,
    /// Output uploaded
    Finished,
    /// Gave up
    Cancelled,
}

impl SegmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentState::Prepared => "prepared",
            SegmentState::Published => "published",
            SegmentState::Accepted => "accepted",
            SegmentState::Finished => "finished",
            SegmentState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentState::Finished | SegmentState::Cancelled)
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reported state of a locked segment.
pub const IN_PROGRESS_STATE: &str = "in_progress";

/// One slice of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub id: SegmentId,

    /// Back-reference to the owning order
    pub order_id: OrderId,

    /// Kind-specific data, tagged with the kind's type name
    pub payload: SegmentPayload,

    #[serde(default)]
    pub state: SegmentState,

    /// Concatenation order inside the order
    pub position: u32,

    pub publisher: Author,

    #[serde(default)]
    pub input_storage_claim_id: Option<String>,

    #[serde(default)]
    pub output_storage_claim_id: Option<String>,

    #[serde(default)]
    pub locked_by: Option<Author>,

    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retries_count: u32,

    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

impl Segment {
    /// Build a fresh `prepared` segment.
    pub fn new(order_id: OrderId, position: u32, payload: SegmentPayload, publisher: Author) -> Self {
        Self {
            id: SegmentId::new(),
            order_id,
            payload,
            state: SegmentState::Prepared,
            position,
            publisher,
            input_storage_claim_id: None,
            output_storage_claim_id: None,
            locked_by: None,
            locked_until: None,
            retries_count: 0,
            retry_at: None,
            last_error: None,
            cancellation_reason: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }

    /// A lock is active while both fields are set and the deadline has not passed.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        match (&self.locked_by, self.locked_until) {
            (Some(_), Some(until)) => now <= until,
            _ => false,
        }
    }

    /// Whether `performer` currently holds the lock.
    pub fn is_locked_by(&self, performer: &Author, now: DateTime<Utc>) -> bool {
        self.is_locked(now) && self.locked_by.as_ref() == Some(performer)
    }

    /// Persisted state, or `in_progress` while locked.
    pub fn current_state(&self, now: DateTime<Utc>) -> &'static str {
        if self.is_locked(now) {
            IN_PROGRESS_STATE
        } else {
            self.state.as_str()
        }
    }

    /// Retry budget left and the retry delay has passed.
    pub fn can_retry(&self, now: DateTime<Utc>) -> bool {
        self.retries_count < MAX_RETRIES_COUNT && self.retry_at.map_or(true, |at| now > at)
    }

    /// Actionable: may be handed to a new performer.
    pub fn can_perform(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, SegmentState::Published | SegmentState::Accepted)
            && !self.is_locked(now)
            && self.can_retry(now)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut validation = ValidationError::new();

        if self.id.is_empty() {
            validation.add("id", "is required");
        }

        if self.order_id.is_empty() {
            validation.add("order_id", "is required");
        }

        if self.payload.muxer().is_empty() {
            validation.add("muxer", "is required");
        }

        if self.publisher.is_empty() {
            validation.add("publisher", "is required");
        }

        if matches!(
            self.state,
            SegmentState::Published | SegmentState::Accepted | SegmentState::Finished
        ) && self.input_storage_claim_id.as_deref().map_or(true, str::is_empty)
        {
            validation.add("input_storage_claim_id", "is required once published");
        }

        if self.state == SegmentState::Finished
            && self.output_storage_claim_id.as_deref().map_or(true, str::is_empty)
        {
            validation.add("output_storage_claim_id", "is required once finished");
        }

        if self.state == SegmentState::Cancelled
            && self.cancellation_reason.as_deref().map_or(true, str::is_empty)
        {
            validation.add("cancellation_reason", "is required when cancelled");
        }

        if self.locked_by.is_some() != self.locked_until.is_some() {
            validation.add("locked_until", "must be set together with locked_by");
        }

        validation.into_result()
    }
}
