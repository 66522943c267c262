//! Shared models for the fftb job dealer.
//!
//! This crate provides Serde-serializable types for:
//! - Segments and orders with their state machines
//! - Publisher and performer identities
//! - The dealer error taxonomy and problem-details bodies
//! - Request/response bodies of the dealer API

pub mod author;
pub mod error;
pub mod id;
pub mod kind;
pub mod mutator;
pub mod order;
pub mod params;
pub mod problem;
pub mod progress;
pub mod request;
pub mod segment;

// Re-export common types
pub use author::Author;
pub use error::{DealerError, DealerResult, ErrorKind, ResultExt, ValidationError};
pub use id::{OrderId, SegmentId};
pub use kind::{
    ConvertOrderPayload, ConvertSegmentPayload, OrderPayload, SegmentPayload, CONVERT_V1_TYPE,
};
pub use order::{Order, OrderState};
pub use params::ConvertParams;
pub use problem::ProblemDetails;
pub use progress::{Progress, ProgressStep};
pub use request::{
    AddOrderRequest, AllocateSegmentRequest, AuthorityResponse, AuthorityRole, CancelRequest,
    CountResponse, CreateAuthorityRequest, CreateSessionRequest, FailSegmentRequest, SegmentFilter,
    SegmentsQuery, SessionResponse, StorageClaimResponse,
};
pub use segment::{
    Segment, SegmentState, CANCELLATION_REASON_CANCELLED, CANCELLATION_REASON_FAILED,
    CANCELLATION_REASON_ORDER_CANCELLED, MAX_RETRIES_COUNT, SEGMENT_LOCK_DURATION_SECS,
};
