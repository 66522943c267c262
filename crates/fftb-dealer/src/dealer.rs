//! Dealer contracts, one trait per caller role.

use async_trait::async_trait;
use fftb_models::{
    AllocateSegmentRequest, Author, DealerResult, OrderId, Progress, Segment, SegmentFilter,
    SegmentId,
};
use fftb_storage::StorageClaim;

/// Operations available to the publisher that owns segments.
///
/// Every mutation checks that `publisher` is the segment's publisher and
/// fails `PublisherMismatch` otherwise.
#[async_trait]
pub trait SegmentPublisher: Send + Sync {
    /// Create a `prepared` segment. Fails `UnknownType` for an unknown kind.
    async fn allocate_segment(
        &self,
        publisher: &Author,
        request: AllocateSegmentRequest,
    ) -> DealerResult<Segment>;

    /// Create the input claim and record its id on the segment.
    async fn allocate_input_storage_claim(
        &self,
        publisher: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>>;

    /// Resolve the output claim. Fails `MissingStorageClaim` when unset.
    async fn get_output_storage_claim(
        &self,
        publisher: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>>;

    /// `prepared → published`.
    async fn publish_segment(&self, publisher: &Author, id: &SegmentId) -> DealerResult<()>;

    /// `cancelled → published` with a fresh retry budget.
    async fn republish_segment(&self, publisher: &Author, id: &SegmentId) -> DealerResult<()>;

    /// Cancel a non-terminal segment. Cancelling twice is a no-op.
    async fn cancel_segment(&self, publisher: &Author, id: &SegmentId, reason: &str) -> DealerResult<()>;

    /// Purge both claims of a finished segment and forget it.
    async fn consume_segment(&self, publisher: &Author, id: &SegmentId) -> DealerResult<()>;

    async fn get_segment_by_id(&self, author: &Author, id: &SegmentId) -> DealerResult<Segment>;

    /// Segments of an order matching `filter`, ordered by position.
    async fn get_segments_by_order_id(
        &self,
        publisher: &Author,
        order_id: &OrderId,
        filter: SegmentFilter,
    ) -> DealerResult<Vec<Segment>>;

    /// Segments of `publisher` waiting for a performer.
    async fn get_queued_segments_count(&self, publisher: &Author) -> DealerResult<usize>;

    async fn notify_raw_upload(&self, publisher: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;

    async fn notify_result_download(
        &self,
        publisher: &Author,
        id: &SegmentId,
        progress: Progress,
    ) -> DealerResult<()>;
}

/// Operations available to performers.
///
/// Everything except `find_free_segment` requires `performer` to be the
/// segment's lock holder and fails `PerformerMismatch` otherwise.
#[async_trait]
pub trait SegmentPerformer: Send + Sync {
    /// Lock the first actionable segment to `performer`.
    ///
    /// Fails `NotFound` when nothing is actionable and `LockTimeout` when the
    /// selection window could not be entered in time.
    async fn find_free_segment(&self, performer: &Author) -> DealerResult<Segment>;

    async fn get_input_storage_claim(
        &self,
        performer: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>>;

    /// Create a fresh output claim, replacing any previous one.
    async fn allocate_output_storage_claim(
        &self,
        performer: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>>;

    // Progress reports, each renewing the lock.
    async fn notify_raw_download(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;
    async fn notify_process(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;
    async fn notify_result_upload(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;

    async fn finish_segment(&self, performer: &Author, id: &SegmentId) -> DealerResult<()>;

    /// Report a failed attempt; applies the retry policy.
    async fn fail_segment(&self, performer: &Author, id: &SegmentId, error: &str) -> DealerResult<()>;

    /// Release the lock without spending a retry.
    async fn quit_segment(&self, performer: &Author, id: &SegmentId) -> DealerResult<()>;
}

/// Issues author identities.
#[async_trait]
pub trait AuthorityIssuer: Send + Sync {
    async fn allocate_publisher_authority(&self, name: &str) -> DealerResult<Author>;

    async fn allocate_performer_authority(&self, name: &str) -> DealerResult<Author>;
}

/// A full dealer serves both roles.
pub trait Dealer: SegmentPublisher + SegmentPerformer {}

impl<T: SegmentPublisher + SegmentPerformer> Dealer for T {}
