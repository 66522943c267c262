//! Order: one user-level conversion request.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::segment::MAX_RETRIES_COUNT;
use crate::{Author, OrderId, OrderPayload, Segment, SegmentId, SegmentState, ValidationError};

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Waiting for the publish worker
    #[default]
    Queued,
    /// Segments published, waiting for performers
    InProgress,
    /// Output concatenated
    Finished,
    /// Gave up
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Queued => "queued",
            OrderState::InProgress => "in_progress",
            OrderState::Finished => "finished",
            OrderState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Finished | OrderState::Cancelled)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversion request, split into segments once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Order {
    pub id: OrderId,

    /// Kind-specific data, tagged with the kind's type name
    pub payload: OrderPayload,

    #[serde(default)]
    pub state: OrderState,

    pub publisher: Author,

    /// Segments in allocation order
    #[serde(default)]
    pub segment_ids: Vec<SegmentId>,

    #[serde(default)]
    pub retries_count: u32,

    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

impl Order {
    /// Build a fresh `queued` order.
    pub fn new(payload: OrderPayload, publisher: Author) -> Self {
        Self {
            id: OrderId::new(),
            payload,
            state: OrderState::Queued,
            publisher,
            segment_ids: Vec::new(),
            retries_count: 0,
            retry_at: None,
            last_error: None,
            cancellation_reason: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }

    pub fn can_retry(&self, now: DateTime<Utc>) -> bool {
        self.retries_count < MAX_RETRIES_COUNT && self.retry_at.map_or(true, |at| now > at)
    }

    /// Eligible for the publish worker.
    pub fn can_publish(&self, now: DateTime<Utc>) -> bool {
        self.state == OrderState::Queued && self.can_retry(now)
    }

    /// Every segment of this order is finished and the output can be assembled.
    ///
    /// `segments` must be the segments belonging to this order.
    pub fn can_concat(&self, segments: &[Segment], now: DateTime<Utc>) -> bool {
        self.state == OrderState::InProgress
            && self.can_retry(now)
            && !segments.is_empty()
            && segments.iter().all(|s| s.state == SegmentState::Finished)
    }

    /// Share of finished segments in `0.0..=1.0`.
    pub fn progress(&self, segments: &[Segment]) -> f64 {
        if self.state == OrderState::Finished {
            return 1.0;
        }

        if segments.is_empty() {
            return 0.0;
        }

        let finished = segments
            .iter()
            .filter(|s| s.state == SegmentState::Finished)
            .count();

        finished as f64 / segments.len() as f64
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut validation = ValidationError::new();

        if self.id.is_empty() {
            validation.add("id", "is required");
        }

        if self.payload.in_file().is_empty() {
            validation.add("in_file", "is required");
        }

        if self.payload.out_file().is_empty() {
            validation.add("out_file", "is required");
        }

        if self.publisher.is_empty() {
            validation.add("publisher", "is required");
        }

        if self.state == OrderState::Cancelled
            && self.cancellation_reason.as_deref().map_or(true, str::is_empty)
        {
            validation.add("cancellation_reason", "is required when cancelled");
        }

        validation.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConvertOrderPayload, ConvertParams, ConvertSegmentPayload, SegmentPayload};
    use chrono::Duration;

    fn order() -> Order {
        Order::new(
            OrderPayload::ConvertV1(ConvertOrderPayload {
                params: ConvertParams::default(),
                in_file: "/in/movie.mkv".to_string(),
                out_file: "/out/movie.mp4".to_string(),
            }),
            Author::new("publisher"),
        )
    }

    fn segments(order: &Order, count: u32) -> Vec<Segment> {
        (0..count)
            .map(|position| {
                let mut seg = Segment::new(
                    order.id.clone(),
                    position,
                    SegmentPayload::ConvertV1(ConvertSegmentPayload {
                        params: ConvertParams::default(),
                        muxer: "mp4".to_string(),
                    }),
                    order.publisher.clone(),
                );
                seg.state = SegmentState::Finished;
                seg
            })
            .collect()
    }

    #[test]
    fn test_can_concat_requires_every_segment_finished() {
        let now = Utc::now();
        let mut order = order();
        order.state = OrderState::InProgress;
        let mut segs = segments(&order, 3);

        assert!(order.can_concat(&segs, now));

        segs[1].state = SegmentState::Accepted;
        assert!(!order.can_concat(&segs, now));

        segs[1].state = SegmentState::Finished;
        assert!(order.can_concat(&segs, now));
        assert!(!order.can_concat(&[], now));

        order.state = OrderState::Finished;
        assert!(!order.can_concat(&segs, now));
    }

    #[test]
    fn test_can_publish() {
        let now = Utc::now();
        let mut order = order();
        assert!(order.can_publish(now));

        order.retry_at = Some(now + Duration::seconds(10));
        assert!(!order.can_publish(now));

        order.retry_at = None;
        order.state = OrderState::InProgress;
        assert!(!order.can_publish(now));
    }

    #[test]
    fn test_progress() {
        let mut order = order();
        order.state = OrderState::InProgress;
        let mut segs = segments(&order, 4);
        segs[0].state = SegmentState::Published;
        segs[1].state = SegmentState::Accepted;

        assert!((order.progress(&segs) - 0.5).abs() < f64::EPSILON);
        assert_eq!(order.progress(&[]), 0.0);
    }

    #[test]
    fn test_validate() {
        let mut order = order();
        assert!(order.validate().is_ok());

        order.state = OrderState::Cancelled;
        order.payload = OrderPayload::ConvertV1(ConvertOrderPayload::default());

        let err = order.validate().unwrap_err();
        assert!(err.fields.contains_key("cancellation_reason"));
        assert!(err.fields.contains_key("in_file"));
        assert!(err.fields.contains_key("out_file"));
    }
}
