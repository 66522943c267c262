//! In-process dealer over the registry and a storage controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fftb_models::{
    AllocateSegmentRequest, Author, DealerError, DealerResult, OrderId, Progress, ResultExt,
    Segment, SegmentFilter, SegmentId, SegmentState, ValidationError,
};
use fftb_registry::Registry;
use fftb_storage::{StorageClaim, StorageController};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dealer::{AuthorityIssuer, SegmentPerformer, SegmentPublisher};
use crate::metrics;

/// Upper bound for entering the free-segment selection window.
pub const FREE_SEGMENT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Dealer backed by a local [`Registry`].
///
/// Segment selection is serialized by a try-lock with a bounded wait; every
/// read-modify-write of a record runs under a second mutex so a selection
/// never interleaves with a lock renewal of the same segment.
pub struct LocalDealer {
    registry: Registry,
    storage: Arc<dyn StorageController>,
    free_segment_lock: Mutex<()>,
    records: Mutex<()>,
    free_segment_timeout: Duration,
}

impl LocalDealer {
    pub fn new(registry: Registry, storage: Arc<dyn StorageController>) -> Self {
        Self {
            registry,
            storage,
            free_segment_lock: Mutex::new(()),
            records: Mutex::new(()),
            free_segment_timeout: FREE_SEGMENT_LOCK_TIMEOUT,
        }
    }

    /// Override the selection window timeout.
    pub fn with_free_segment_timeout(mut self, timeout: Duration) -> Self {
        self.free_segment_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn find_segment(&self, id: &SegmentId) -> DealerResult<Segment> {
        self.registry
            .find_segment_by_id(id)
            .await
            .with_context(|| format!("finding segment `{}`", id))
    }

    async fn persist(&self, segment: &Segment) -> DealerResult<()> {
        self.registry
            .persist_segment(segment)
            .await
            .with_context(|| format!("persisting segment `{}`", segment.id))
    }

    /// Load, change and persist one segment under the records lock.
    async fn mutate_segment<F>(&self, id: &SegmentId, change: F) -> DealerResult<Segment>
    where
        F: FnOnce(&mut Segment) -> DealerResult<()> + Send,
    {
        let _guard = self.records.lock().await;

        let mut segment = self.find_segment(id).await?;
        change(&mut segment)?;
        self.persist(&segment).await?;

        Ok(segment)
    }

    /// Renew the performer's lock while reporting progress.
    async fn segment_progress(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        let segment = self
            .mutate_segment(id, |segment| {
                segment.ensure_performer(performer)?;
                segment.lock(performer, Utc::now())
            })
            .await
            .context("renewing segment lock")?;

        debug!(
            segment_id = %segment.id,
            order_id = %segment.order_id,
            performer = %performer,
            step = %progress.step,
            percent = progress.percent,
            "Segment progress"
        );

        Ok(())
    }

    async fn build_claim(&self, claim_id: &str) -> DealerResult<Box<dyn StorageClaim>> {
        self.storage
            .build_storage_claim(claim_id)
            .await
            .with_context(|| format!("building storage claim `{}`", claim_id))
    }

    async fn try_purge_claim(&self, claim_id: Option<&str>) {
        let Some(claim_id) = claim_id else {
            return;
        };

        if let Err(e) = self.storage.purge_storage_claim(claim_id).await {
            warn!(claim_id = %claim_id, error = %e, "Failed to purge storage claim");
        }
    }
}

fn claim_id(role: &str, segment: &Segment) -> String {
    format!("{}_{}_{}_{}", role, segment.order_id, segment.id, uuid::Uuid::new_v4())
}

#[async_trait]
impl SegmentPublisher for LocalDealer {
    async fn allocate_segment(
        &self,
        publisher: &Author,
        request: AllocateSegmentRequest,
    ) -> DealerResult<Segment> {
        if publisher.is_empty() {
            return Err(DealerError::MissingPublisher);
        }

        let payload = request.to_payload()?;

        let mut validation = ValidationError::new();
        if request.order_id.is_empty() {
            validation.add("order_id", "is required");
        }
        if request.muxer.is_empty() {
            validation.add("muxer", "is required");
        }
        validation.into_result()?;

        let segment = Segment::new(request.order_id, request.position, payload, publisher.clone());

        info!(
            segment_id = %segment.id,
            order_id = %segment.order_id,
            position = segment.position,
            "Allocating segment"
        );

        self.persist(&segment).await?;
        metrics::record_segment_allocated(segment.type_name());

        Ok(segment)
    }

    async fn allocate_input_storage_claim(
        &self,
        publisher: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        let _guard = self.records.lock().await;

        let mut segment = self.find_segment(id).await?;
        segment.ensure_publisher(publisher)?;

        if let Some(existing) = &segment.input_storage_claim_id {
            return Err(DealerError::StorageClaimAlreadyAllocated(existing.clone()));
        }

        let claim_id = claim_id("input", &segment);
        let claim = self
            .storage
            .allocate_storage_claim(&claim_id)
            .await
            .context("allocating input storage claim")?;

        segment.input_storage_claim_id = Some(claim_id);
        self.persist(&segment).await.context("persisting input claim id")?;

        Ok(claim)
    }

    async fn get_output_storage_claim(
        &self,
        publisher: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        let segment = self.find_segment(id).await?;
        segment.ensure_publisher(publisher)?;

        let claim_id = segment
            .output_storage_claim_id
            .as_deref()
            .ok_or_else(|| DealerError::missing_storage_claim(format!("segment `{}` has no output", id)))?;

        self.build_claim(claim_id).await
    }

    async fn publish_segment(&self, publisher: &Author, id: &SegmentId) -> DealerResult<()> {
        let segment = self
            .mutate_segment(id, |segment| {
                segment.ensure_publisher(publisher)?;
                segment.publish()
            })
            .await
            .context("publishing segment")?;

        info!(segment_id = %segment.id, order_id = %segment.order_id, "Published segment");
        Ok(())
    }

    async fn republish_segment(&self, publisher: &Author, id: &SegmentId) -> DealerResult<()> {
        let segment = self
            .mutate_segment(id, |segment| {
                segment.ensure_publisher(publisher)?;
                segment.republish()
            })
            .await
            .context("republishing segment")?;

        info!(segment_id = %segment.id, order_id = %segment.order_id, "Republished segment");
        Ok(())
    }

    async fn cancel_segment(&self, publisher: &Author, id: &SegmentId, reason: &str) -> DealerResult<()> {
        let _guard = self.records.lock().await;

        let mut segment = self.find_segment(id).await?;
        segment.ensure_publisher(publisher)?;

        if !segment.cancel(reason).context("cancelling segment")? {
            return Ok(());
        }

        self.persist(&segment).await?;

        info!(segment_id = %segment.id, reason = %reason, "Cancelled segment");
        metrics::record_segment_cancelled(reason);
        Ok(())
    }

    async fn consume_segment(&self, publisher: &Author, id: &SegmentId) -> DealerResult<()> {
        let segment = {
            let _guard = self.records.lock().await;

            let segment = self.find_segment(id).await?;
            segment.ensure_publisher(publisher)?;

            if segment.state != SegmentState::Finished {
                let mut validation = ValidationError::new();
                validation.add("state", format!("cannot consume a {} segment", segment.state));
                return Err(validation.into());
            }

            self.registry
                .destroy_segment(id)
                .await
                .context("destroying segment")?;
            segment
        };

        self.try_purge_claim(segment.input_storage_claim_id.as_deref()).await;
        self.try_purge_claim(segment.output_storage_claim_id.as_deref()).await;

        info!(segment_id = %segment.id, order_id = %segment.order_id, "Consumed segment");
        Ok(())
    }

    async fn get_segment_by_id(&self, _author: &Author, id: &SegmentId) -> DealerResult<Segment> {
        self.find_segment(id).await
    }

    async fn get_segments_by_order_id(
        &self,
        publisher: &Author,
        order_id: &OrderId,
        filter: SegmentFilter,
    ) -> DealerResult<Vec<Segment>> {
        let segments = self
            .registry
            .find_segments_by_order_id(order_id)
            .await
            .context("searching order segments")?;

        Ok(segments
            .into_iter()
            .filter(|s| &s.publisher == publisher && filter.matches(s.state))
            .collect())
    }

    async fn get_queued_segments_count(&self, publisher: &Author) -> DealerResult<usize> {
        let now = Utc::now();
        let segments = self
            .registry
            .search_all_segments(|s| {
                &s.publisher == publisher
                    && matches!(s.state, SegmentState::Published | SegmentState::Accepted)
                    && !s.is_locked(now)
            })
            .await
            .context("searching queued segments")?;

        metrics::set_queued_segments(segments.len());
        Ok(segments.len())
    }

    async fn notify_raw_upload(&self, publisher: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        let segment = self.find_segment(id).await?;
        segment.ensure_publisher(publisher)?;

        debug!(segment_id = %id, step = %progress.step, percent = progress.percent, "Input upload progress");
        Ok(())
    }

    async fn notify_result_download(
        &self,
        publisher: &Author,
        id: &SegmentId,
        progress: Progress,
    ) -> DealerResult<()> {
        let segment = self.find_segment(id).await?;
        segment.ensure_publisher(publisher)?;

        debug!(segment_id = %id, step = %progress.step, percent = progress.percent, "Output download progress");
        Ok(())
    }
}

#[async_trait]
impl SegmentPerformer for LocalDealer {
    async fn find_free_segment(&self, performer: &Author) -> DealerResult<Segment> {
        if performer.is_empty() {
            return Err(DealerError::MissingPerformer);
        }

        // Both guards count against the same deadline.
        let window = async {
            let selection = self.free_segment_lock.lock().await;
            let records = self.records.lock().await;
            (selection, records)
        };
        let (_selection, _guard) = match tokio::time::timeout(self.free_segment_timeout, window).await {
            Ok(guards) => guards,
            Err(_) => {
                metrics::record_lock_timeout();
                return Err(DealerError::LockTimeout);
            }
        };

        let now = Utc::now();
        let mut segment = self
            .registry
            .search_segment(|s| s.can_perform(now))
            .await
            .context("looking for free segment")?;

        segment.lock(performer, now).context("locking segment")?;
        self.persist(&segment).await?;

        info!(
            segment_id = %segment.id,
            order_id = %segment.order_id,
            performer = %performer,
            "Segment locked"
        );
        metrics::record_segment_locked();

        Ok(segment)
    }

    async fn get_input_storage_claim(
        &self,
        performer: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        let segment = self.find_segment(id).await?;
        segment.ensure_performer(performer)?;

        let claim_id = segment
            .input_storage_claim_id
            .as_deref()
            .ok_or_else(|| DealerError::missing_storage_claim(format!("segment `{}` has no input", id)))?;

        self.build_claim(claim_id).await
    }

    async fn allocate_output_storage_claim(
        &self,
        performer: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        let (claim, previous) = {
            let _guard = self.records.lock().await;

            let mut segment = self.find_segment(id).await?;
            segment.ensure_performer(performer)?;

            let claim_id = claim_id("output", &segment);
            let claim = self
                .storage
                .allocate_storage_claim(&claim_id)
                .await
                .context("allocating output storage claim")?;

            let previous = segment.output_storage_claim_id.replace(claim_id);
            self.persist(&segment).await.context("persisting output claim id")?;

            (claim, previous)
        };

        // Leftover from an earlier attempt
        self.try_purge_claim(previous.as_deref()).await;

        Ok(claim)
    }

    async fn notify_raw_download(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.segment_progress(performer, id, progress).await
    }

    async fn notify_process(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.segment_progress(performer, id, progress).await
    }

    async fn notify_result_upload(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.segment_progress(performer, id, progress).await
    }

    async fn finish_segment(&self, performer: &Author, id: &SegmentId) -> DealerResult<()> {
        let segment = self
            .mutate_segment(id, |segment| {
                segment.ensure_performer(performer)?;
                segment.finish()
            })
            .await
            .context("finishing segment")?;

        info!(
            segment_id = %segment.id,
            order_id = %segment.order_id,
            performer = %performer,
            "Segment is finished"
        );
        metrics::record_segment_finished();

        self.try_purge_claim(segment.input_storage_claim_id.as_deref()).await;
        Ok(())
    }

    async fn fail_segment(&self, performer: &Author, id: &SegmentId, error: &str) -> DealerResult<()> {
        let mut exhausted = false;
        let segment = self
            .mutate_segment(id, |segment| {
                segment.ensure_performer(performer)?;
                exhausted = segment.fail(error, Utc::now())?;
                Ok(())
            })
            .await
            .context("failing segment")?;

        warn!(
            segment_id = %segment.id,
            order_id = %segment.order_id,
            performer = %performer,
            retries = segment.retries_count,
            error = %error,
            "Received segment failure"
        );
        metrics::record_segment_failed(exhausted);
        if exhausted {
            metrics::record_segment_cancelled(fftb_models::CANCELLATION_REASON_FAILED);
        }

        Ok(())
    }

    async fn quit_segment(&self, performer: &Author, id: &SegmentId) -> DealerResult<()> {
        let segment = self
            .mutate_segment(id, |segment| {
                segment.ensure_performer(performer)?;
                segment.unlock();
                Ok(())
            })
            .await
            .context("quitting segment")?;

        debug!(segment_id = %segment.id, performer = %performer, "Quit segment");
        Ok(())
    }
}

#[async_trait]
impl AuthorityIssuer for LocalDealer {
    async fn allocate_publisher_authority(&self, name: &str) -> DealerResult<Author> {
        authority(name)?;
        self.register_author(Author::publisher(name)).await
    }

    async fn allocate_performer_authority(&self, name: &str) -> DealerResult<Author> {
        authority(name)?;
        self.register_author(Author::performer(name)).await
    }
}

impl LocalDealer {
    /// An authority is issued once per name.
    async fn register_author(&self, author: Author) -> DealerResult<Author> {
        let _guard = self.records.lock().await;

        let registered = self
            .registry
            .register_author(&author)
            .await
            .with_context(|| format!("registering author `{}`", author))?;

        if !registered {
            warn!(author = %author, "Authority already issued");
            let mut validation = ValidationError::new();
            validation.add("name", "is already taken");
            return Err(validation.into());
        }

        info!(author = %author, "Registered author");
        Ok(author)
    }
}

fn authority(name: &str) -> DealerResult<()> {
    let mut validation = ValidationError::new();
    if name.is_empty() {
        validation.add("name", "is required");
    } else if name.contains('/') {
        validation.add("name", "must not contain `/`");
    }
    validation.into_result().map_err(Into::into)
}
