//! Structured segment logging.

use fftb_models::{Author, Segment};
use tracing::{error, info, warn, Span};

/// Logs segment lifecycle events with consistent fields.
#[derive(Debug, Clone)]
pub struct SegmentLogger {
    segment_id: String,
    order_id: String,
    performer: String,
}

impl SegmentLogger {
    pub fn new(segment: &Segment, performer: &Author) -> Self {
        Self {
            segment_id: segment.id.to_string(),
            order_id: segment.order_id.to_string(),
            performer: performer.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            segment_id = %self.segment_id,
            order_id = %self.order_id,
            performer = %self.performer,
            "Segment started: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            segment_id = %self.segment_id,
            order_id = %self.order_id,
            performer = %self.performer,
            "Segment warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            segment_id = %self.segment_id,
            order_id = %self.order_id,
            performer = %self.performer,
            "Segment error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            segment_id = %self.segment_id,
            order_id = %self.order_id,
            performer = %self.performer,
            "Segment completed: {}", message
        );
    }

    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    /// Span carrying the segment fields for everything logged inside it.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "segment",
            segment_id = %self.segment_id,
            order_id = %self.order_id,
            performer = %self.performer
        )
    }
}
