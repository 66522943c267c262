//! Dealer and contracter metrics.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const SEGMENTS_ALLOCATED_TOTAL: &str = "fftb_segments_allocated_total";
    pub const SEGMENTS_LOCKED_TOTAL: &str = "fftb_segments_locked_total";
    pub const SEGMENTS_FINISHED_TOTAL: &str = "fftb_segments_finished_total";
    pub const SEGMENTS_FAILED_TOTAL: &str = "fftb_segments_failed_total";
    pub const SEGMENTS_CANCELLED_TOTAL: &str = "fftb_segments_cancelled_total";
    pub const SEGMENTS_QUEUED: &str = "fftb_segments_queued";
    pub const LOCK_TIMEOUTS_TOTAL: &str = "fftb_lock_timeouts_total";

    pub const ORDERS_QUEUED_TOTAL: &str = "fftb_orders_queued_total";
    pub const ORDERS_PUBLISHED_TOTAL: &str = "fftb_orders_published_total";
    pub const ORDERS_CONCATENATED_TOTAL: &str = "fftb_orders_concatenated_total";
    pub const ORDERS_FAILED_TOTAL: &str = "fftb_orders_failed_total";
}

pub fn record_segment_allocated(kind: &str) {
    let labels = [("type", kind.to_string())];
    counter!(names::SEGMENTS_ALLOCATED_TOTAL, &labels).increment(1);
}

pub fn record_segment_locked() {
    counter!(names::SEGMENTS_LOCKED_TOTAL).increment(1);
}

pub fn record_segment_finished() {
    counter!(names::SEGMENTS_FINISHED_TOTAL).increment(1);
}

/// `exhausted` marks failures that hit the retry cap.
pub fn record_segment_failed(exhausted: bool) {
    let labels = [("exhausted", exhausted.to_string())];
    counter!(names::SEGMENTS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_segment_cancelled(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::SEGMENTS_CANCELLED_TOTAL, &labels).increment(1);
}

pub fn set_queued_segments(count: usize) {
    gauge!(names::SEGMENTS_QUEUED).set(count as f64);
}

pub fn record_lock_timeout() {
    counter!(names::LOCK_TIMEOUTS_TOTAL).increment(1);
}

pub fn record_order_queued() {
    counter!(names::ORDERS_QUEUED_TOTAL).increment(1);
}

pub fn record_order_published() {
    counter!(names::ORDERS_PUBLISHED_TOTAL).increment(1);
}

pub fn record_order_concatenated() {
    counter!(names::ORDERS_CONCATENATED_TOTAL).increment(1);
}

pub fn record_order_failed() {
    counter!(names::ORDERS_FAILED_TOTAL).increment(1);
}
