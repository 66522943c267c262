//! Publisher side of the dealer: orders in, finished files out.
//!
//! The contracter slices an order's input file, hands the slices to the
//! dealer as segments and, once every segment is finished, downloads the
//! outputs and joins them into the order's output file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use fftb_media::{MediaEngine, SliceFile};
use fftb_models::{
    AddOrderRequest, AllocateSegmentRequest, Author, DealerError, DealerResult, Order, OrderId,
    OrderPayload, OrderState, Progress, ProgressStep, ResultExt, Segment, SegmentFilter, SegmentId,
    ValidationError, CANCELLATION_REASON_CANCELLED, CANCELLATION_REASON_ORDER_CANCELLED,
};
use fftb_registry::Registry;
use fftb_storage::{upload_file, StorageClient};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ContracterConfig;
use crate::dealer::SegmentPublisher;
use crate::metrics;

/// Order bookkeeping on top of a segment dealer.
pub struct Contracter {
    dealer: Arc<dyn SegmentPublisher>,
    registry: Registry,
    engine: Arc<dyn MediaEngine>,
    storage: Arc<dyn StorageClient>,
    config: ContracterConfig,
    orders: Mutex<()>,
}

impl Contracter {
    pub fn new(
        dealer: Arc<dyn SegmentPublisher>,
        registry: Registry,
        engine: Arc<dyn MediaEngine>,
        storage: Arc<dyn StorageClient>,
        config: ContracterConfig,
    ) -> Self {
        Self {
            dealer,
            registry,
            engine,
            storage,
            config,
            orders: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ContracterConfig {
        &self.config
    }

    pub fn dealer(&self) -> &Arc<dyn SegmentPublisher> {
        &self.dealer
    }

    /// Validate and persist a new `queued` order.
    pub async fn add_order_to_queue(&self, publisher: &Author, request: AddOrderRequest) -> DealerResult<Order> {
        if publisher.is_empty() {
            return Err(DealerError::MissingPublisher);
        }

        let mut payload = request.to_payload()?;
        self.resolve_files(&mut payload)?;

        let order = Order::new(payload, publisher.clone());
        order.validate()?;
        self.registry
            .persist_order(&order)
            .await
            .context("adding order to queue")?;

        metrics::record_order_queued();
        info!(order_id = %order.id, publisher = %publisher, in_file = %order.payload.in_file(), "Order queued");

        Ok(order)
    }

    /// Pin the payload's files under the configured files root.
    fn resolve_files(&self, payload: &mut OrderPayload) -> DealerResult<()> {
        let OrderPayload::ConvertV1(convert) = payload;
        let mut validation = ValidationError::new();

        match self.config.resolve_file(&convert.in_file) {
            Some(path) => convert.in_file = path.display().to_string(),
            None => validation.add("in_file", "must be inside the files root"),
        }
        match self.config.resolve_file(&convert.out_file) {
            Some(path) => convert.out_file = path.display().to_string(),
            None => validation.add("out_file", "must be inside the files root"),
        }

        if !validation.is_empty() {
            warn!(error = %validation, "Order files rejected");
        }
        Ok(validation.into_result()?)
    }

    /// First order waiting for publication.
    pub async fn pick_order_from_queue(&self) -> DealerResult<Order> {
        let now = Utc::now();
        Ok(self.registry.search_order(|o| o.can_publish(now)).await?)
    }

    pub async fn get_order_by_id(&self, id: &OrderId) -> DealerResult<Order> {
        self.registry
            .find_order_by_id(id)
            .await
            .with_context(|| format!("finding order `{}`", id))
    }

    pub async fn get_all_orders(&self) -> DealerResult<Vec<Order>> {
        Ok(self.registry.search_all_orders(|_| true).await?)
    }

    /// Segments the dealer holds for `order`.
    async fn order_segments(&self, order: &Order) -> DealerResult<Vec<Segment>> {
        self.dealer
            .get_segments_by_order_id(&order.publisher, &order.id, SegmentFilter::default())
            .await
            .with_context(|| format!("listing segments of order `{}`", order.id))
    }

    /// Cancel the order and every segment it still has in flight.
    pub async fn cancel_order_by_id(&self, id: &OrderId, reason: Option<&str>) -> DealerResult<Order> {
        let reason = reason
            .filter(|r| !r.is_empty())
            .unwrap_or(CANCELLATION_REASON_CANCELLED);

        let _guard = self.orders.lock().await;

        let mut order = self.get_order_by_id(id).await?;
        let mut segments = self.order_segments(&order).await?;
        let touched = order.cancel(reason, &mut segments)?;

        self.registry.persist_order(&order).await?;
        self.cancel_segments(&order, &touched).await;

        info!(order_id = %order.id, reason = %reason, segments = touched.len(), "Order cancelled");
        Ok(order)
    }

    /// Apply the retry policy to a failed publish or concat attempt.
    pub async fn fail_order_by_id(&self, id: &OrderId, error: &str) -> DealerResult<Order> {
        let _guard = self.orders.lock().await;

        let mut order = self.get_order_by_id(id).await?;
        let mut segments = self.order_segments(&order).await?;
        let touched = order.fail(error, &mut segments, Utc::now())?;

        self.registry.persist_order(&order).await?;
        self.cancel_segments(&order, &touched).await;

        metrics::record_order_failed();
        warn!(
            order_id = %order.id,
            retries = order.retries_count,
            state = %order.state,
            error = %error,
            "Order attempt failed"
        );

        Ok(order)
    }

    async fn cancel_segments(&self, order: &Order, ids: &[SegmentId]) {
        for segment_id in ids {
            if let Err(e) = self
                .dealer
                .cancel_segment(&order.publisher, segment_id, CANCELLATION_REASON_ORDER_CANCELLED)
                .await
            {
                warn!(order_id = %order.id, segment_id = %segment_id, error = %e, "Failed to cancel segment");
            }
        }
    }

    /// Slice the input, hand every slice to the dealer and mark the order `in_progress`.
    #[instrument(skip(self, id, cancel), fields(order_id = %id))]
    pub async fn publish_order(&self, id: &OrderId, cancel: &CancellationToken) -> DealerResult<Order> {
        let order = self.get_order_by_id(id).await?;
        if order.state != OrderState::Queued {
            return Err(not_queued(&order));
        }
        if cancel.is_cancelled() {
            return Err(DealerError::unknown("publishing cancelled"));
        }

        let work_dir = self.config.tmp_dir.join(format!("publish_{}", order.id));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .context("creating publish directory")?;

        let published = self.publish_slices(&order, &work_dir, cancel).await;
        remove_dir(&work_dir).await;
        let segment_ids = published?;

        let _guard = self.orders.lock().await;

        // Reload so a cancel that raced the upload wins.
        let mut order = self.get_order_by_id(id).await?;
        order.publish(segment_ids)?;
        self.registry.persist_order(&order).await?;

        metrics::record_order_published();
        info!(order_id = %order.id, segments = order.segment_ids.len(), "Order published");

        Ok(order)
    }

    async fn publish_slices(
        &self,
        order: &Order,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> DealerResult<Vec<SegmentId>> {
        let in_file = PathBuf::from(order.payload.in_file());
        let muxer = muxer_of(&in_file)?;

        let slices = self
            .engine
            .slice(&in_file, work_dir, self.config.segment_duration_secs, cancel.clone())
            .await
            .context("slicing input")?;

        // TODO: segments allocated before a failure below stay orphaned in
        // `prepared`; cancel them at the dealer once a rollback policy exists.
        let mut segments = Vec::with_capacity(slices.len());
        for slice in &slices {
            let request = AllocateSegmentRequest::convert_v1(
                order.id.clone(),
                slice.position,
                order.payload.params().clone(),
                muxer.clone(),
            );
            let segment = self
                .dealer
                .allocate_segment(&order.publisher, request)
                .await
                .context("allocating segment")?;
            segments.push((segment, slice));
        }

        for (segment, slice) in &segments {
            if cancel.is_cancelled() {
                return Err(DealerError::unknown("publishing cancelled"));
            }

            let claim = self
                .dealer
                .allocate_input_storage_claim(&order.publisher, &segment.id)
                .await?;
            let bytes = upload_file(claim.as_ref(), &slice.path)
                .await
                .with_context(|| format!("uploading slice {}", slice.position))?;

            debug!(segment_id = %segment.id, position = slice.position, bytes, "Uploaded slice");

            if let Err(e) = self
                .dealer
                .notify_raw_upload(&order.publisher, &segment.id, Progress::new(ProgressStep::UploadingInput, 1.0))
                .await
            {
                debug!(segment_id = %segment.id, error = %e, "Upload notification dropped");
            }
        }

        for (segment, _) in &segments {
            self.dealer
                .publish_segment(&order.publisher, &segment.id)
                .await
                .context("publishing segment")?;
        }

        Ok(segments.into_iter().map(|(s, _)| s.id).collect())
    }

    /// First `in_progress` order whose segments are all finished.
    pub async fn pick_order_for_concat(&self) -> DealerResult<Order> {
        let now = Utc::now();
        let candidates = self
            .registry
            .search_all_orders(|o| o.state == OrderState::InProgress && o.can_retry(now))
            .await?;

        for order in candidates {
            match self.order_segments(&order).await {
                Ok(segments) if covers_order(&order, &segments) && order.can_concat(&segments, now) => {
                    return Ok(order);
                }
                Ok(_) => {}
                Err(e) => warn!(order_id = %order.id, error = %e, "Skipping order"),
            }
        }

        Err(DealerError::not_found("no order ready for concat"))
    }

    /// Download every segment output, join them and finish the order.
    #[instrument(skip(self, id, cancel), fields(order_id = %id))]
    pub async fn concat_order(&self, id: &OrderId, cancel: &CancellationToken) -> DealerResult<Order> {
        let order = self.get_order_by_id(id).await?;
        let mut segments = self.order_segments(&order).await?;

        if !covers_order(&order, &segments) || !order.can_concat(&segments, Utc::now()) {
            let mut validation = ValidationError::new();
            validation.add("segment_ids", "not every segment is finished");
            return Err(validation.into());
        }
        if cancel.is_cancelled() {
            return Err(DealerError::unknown("concat cancelled"));
        }
        segments.sort_by_key(|s| s.position);

        let work_dir = self.config.tmp_dir.join(format!("concat_{}", order.id));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .context("creating concat directory")?;

        let joined = self.download_and_join(&order, &segments, &work_dir, cancel).await;
        remove_dir(&work_dir).await;
        joined?;

        let finished = {
            let _guard = self.orders.lock().await;

            let mut order = self.get_order_by_id(id).await?;
            order.finish(&segments)?;
            self.registry.persist_order(&order).await?;
            order
        };

        for segment in &segments {
            if let Err(e) = self.dealer.consume_segment(&order.publisher, &segment.id).await {
                warn!(segment_id = %segment.id, error = %e, "Failed to consume segment");
            }
        }

        metrics::record_order_concatenated();
        info!(order_id = %finished.id, out_file = %finished.payload.out_file(), "Order finished");

        Ok(finished)
    }

    async fn download_and_join(
        &self,
        order: &Order,
        segments: &[Segment],
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> DealerResult<()> {
        let mut slices = Vec::with_capacity(segments.len());

        let downloaded = async {
            for segment in segments {
                let claim = self
                    .dealer
                    .get_output_storage_claim(&order.publisher, &segment.id)
                    .await?;
                let path = self
                    .storage
                    .make_local_copy(claim.as_ref(), work_dir)
                    .await
                    .with_context(|| format!("downloading output of segment `{}`", segment.id))?;

                if let Err(e) = self
                    .dealer
                    .notify_result_download(
                        &order.publisher,
                        &segment.id,
                        Progress::new(ProgressStep::DownloadingOutput, 1.0),
                    )
                    .await
                {
                    debug!(segment_id = %segment.id, error = %e, "Download notification dropped");
                }

                slices.push(SliceFile::new(segment.position, path));
            }

            let out_file = Path::new(order.payload.out_file());
            if let Some(parent) = out_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }

            self.engine
                .concat(&slices, out_file, cancel.clone())
                .await
                .context("concatenating segments")
        }
        .await;

        for slice in &slices {
            if let Err(e) = self.storage.remove_local_copy(&slice.path).await {
                warn!(path = %slice.path.display(), error = %e, "Failed to remove downloaded segment");
            }
        }

        downloaded
    }
}

/// Container of the order's files, taken from the input extension.
fn muxer_of(in_file: &Path) -> DealerResult<String> {
    match in_file.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => Ok(ext.trim_start_matches('.').to_ascii_lowercase()),
        _ => {
            let mut validation = ValidationError::new();
            validation.add("in_file", "must have a file extension");
            Err(validation.into())
        }
    }
}

/// Every segment the order references is among `segments`.
fn covers_order(order: &Order, segments: &[Segment]) -> bool {
    !order.segment_ids.is_empty()
        && order
            .segment_ids
            .iter()
            .all(|id| segments.iter().any(|s| &s.id == id))
}

fn not_queued(order: &Order) -> DealerError {
    let mut validation = ValidationError::new();
    validation.add("state", format!("order is {}, not queued", order.state));
    validation.into()
}

async fn remove_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), error = %e, "Failed to remove work directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_muxer_from_extension() {
        assert_eq!(muxer_of(Path::new("/in/movie.MKV")).unwrap(), "mkv");
        assert_eq!(muxer_of(Path::new("/in/clip.mp4")).unwrap(), "mp4");
        assert!(muxer_of(Path::new("/in/noext")).is_err());
    }
}
