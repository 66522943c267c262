//! Worker against a local dealer with fake engines.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fftb_dealer::{LocalDealer, SegmentPerformer, SegmentPublisher};
use fftb_media::{MediaEngine, MediaError, MediaMetadata, MediaResult, SliceFile, TranscodeRequest};
use fftb_models::{
    AllocateSegmentRequest, Author, ConvertParams, DealerError, DealerResult, OrderId, Progress, Segment, SegmentId,
    SegmentState,
};
use fftb_registry::{FileStore, Registry};
use fftb_storage::{LocalStorageController, StorageClaim};
use fftb_worker::{Outcome, Poll, SegmentHandler, Worker};
use mockall::mock;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

mock! {
    pub Engine {}

    #[async_trait]
    impl MediaEngine for Engine {
        async fn get_metadata(&self, path: &Path) -> MediaResult<MediaMetadata>;
        async fn transcode(
            &self,
            request: TranscodeRequest,
            progress: mpsc::Sender<Progress>,
            cancel: CancellationToken,
        ) -> MediaResult<()>;
        async fn slice(
            &self,
            input: &Path,
            out_dir: &Path,
            segment_secs: u32,
            cancel: CancellationToken,
        ) -> MediaResult<Vec<SliceFile>>;
        async fn concat(
            &self,
            slices: &[SliceFile],
            output: &Path,
            cancel: CancellationToken,
        ) -> MediaResult<()>;
    }
}

mock! {
    pub Performer {}

    #[async_trait]
    impl SegmentPerformer for Performer {
        async fn find_free_segment(&self, performer: &Author) -> DealerResult<Segment>;
        async fn get_input_storage_claim(
            &self,
            performer: &Author,
            id: &SegmentId,
        ) -> DealerResult<Box<dyn StorageClaim>>;
        async fn allocate_output_storage_claim(
            &self,
            performer: &Author,
            id: &SegmentId,
        ) -> DealerResult<Box<dyn StorageClaim>>;
        async fn notify_raw_download(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;
        async fn notify_process(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;
        async fn notify_result_upload(&self, performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()>;
        async fn finish_segment(&self, performer: &Author, id: &SegmentId) -> DealerResult<()>;
        async fn fail_segment(&self, performer: &Author, id: &SegmentId, error: &str) -> DealerResult<()>;
        async fn quit_segment(&self, performer: &Author, id: &SegmentId) -> DealerResult<()>;
    }
}

/// Engine whose transcode only ends when cancelled.
struct HangingEngine;

#[async_trait]
impl MediaEngine for HangingEngine {
    async fn get_metadata(&self, _path: &Path) -> MediaResult<MediaMetadata> {
        Err(MediaError::InvalidVideo("not probed".to_string()))
    }

    async fn transcode(
        &self,
        _request: TranscodeRequest,
        _progress: mpsc::Sender<Progress>,
        cancel: CancellationToken,
    ) -> MediaResult<()> {
        cancel.cancelled().await;
        Err(MediaError::Cancelled)
    }

    async fn slice(
        &self,
        _input: &Path,
        _out_dir: &Path,
        _segment_secs: u32,
        _cancel: CancellationToken,
    ) -> MediaResult<Vec<SliceFile>> {
        Ok(Vec::new())
    }

    async fn concat(&self, _slices: &[SliceFile], _output: &Path, _cancel: CancellationToken) -> MediaResult<()> {
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
    dealer: Arc<LocalDealer>,
    registry: Registry,
    publisher: Author,
    performer: Author,
}

impl Fixture {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("registry.json")).await.unwrap());
        let registry = Registry::new(store);
        let storage = Arc::new(LocalStorageController::new(dir.path().join("storage")).unwrap());
        let dealer = Arc::new(LocalDealer::new(registry.clone(), storage));

        Self {
            dir,
            dealer,
            registry,
            publisher: Author::publisher("contracter"),
            performer: Author::performer("w1"),
        }
    }

    async fn published(&self) -> Segment {
        let request = AllocateSegmentRequest::convert_v1(OrderId::new(), 0, ConvertParams::default(), "mkv");
        let segment = self.dealer.allocate_segment(&self.publisher, request).await.unwrap();
        let claim = self
            .dealer
            .allocate_input_storage_claim(&self.publisher, &segment.id)
            .await
            .unwrap();
        claim
            .write_from(Box::new(std::io::Cursor::new(b"raw".to_vec())), Some(3))
            .await
            .unwrap();
        self.dealer.publish_segment(&self.publisher, &segment.id).await.unwrap();
        segment
    }

    fn worker(&self, engine: Arc<dyn MediaEngine>) -> Worker {
        let handler = SegmentHandler::new(
            self.dealer.clone(),
            engine,
            self.performer.clone(),
            self.dir.path().join("work"),
            Duration::from_millis(10),
        );
        Worker::new(self.dealer.clone(), handler, self.performer.clone(), Duration::from_millis(10))
    }
}

#[tokio::test]
async fn test_idle_when_nothing_published() {
    let fx = Fixture::new().await;
    let worker = fx.worker(Arc::new(MockEngine::new()));

    let polled = assert_ok!(worker.poll_once(&CancellationToken::new()).await);
    assert_eq!(polled, Poll::Idle);
}

#[tokio::test]
async fn test_busy_dealer_is_contended_not_an_error() {
    let dir = TempDir::new().unwrap();
    let performer = Author::performer("w1");

    let mut dealer = MockPerformer::new();
    dealer
        .expect_find_free_segment()
        .times(1)
        .returning(|_| Err(DealerError::LockTimeout));
    dealer.expect_fail_segment().never();
    dealer.expect_quit_segment().never();
    let dealer: Arc<dyn SegmentPerformer> = Arc::new(dealer);

    let handler = SegmentHandler::new(
        dealer.clone(),
        Arc::new(MockEngine::new()),
        performer.clone(),
        dir.path().join("work"),
        Duration::from_millis(10),
    );
    let worker = Worker::new(dealer, handler, performer, Duration::from_millis(10));

    let polled = assert_ok!(worker.poll_once(&CancellationToken::new()).await);
    assert_eq!(polled, Poll::Contended);
}

#[tokio::test]
async fn test_converted_segment_is_finished_with_output() {
    let fx = Fixture::new().await;
    let segment = fx.published().await;

    let mut engine = MockEngine::new();
    engine.expect_transcode().times(1).returning(|request, _, _| {
        assert_eq!(std::fs::read(&request.input).unwrap(), b"raw");
        assert_eq!(request.muxer, "mkv");
        std::fs::write(&request.output, b"converted")?;
        Ok(())
    });
    let worker = fx.worker(Arc::new(engine));

    let polled = assert_ok!(worker.poll_once(&CancellationToken::new()).await);
    assert_eq!(polled, Poll::Handled(Outcome::Finished));

    let stored = fx.registry.find_segment_by_id(&segment.id).await.unwrap();
    assert_eq!(stored.state, SegmentState::Finished);
    assert!(stored.locked_by.is_none());

    let claim = fx
        .dealer
        .get_output_storage_claim(&fx.publisher, &segment.id)
        .await
        .unwrap();
    let mut body = Vec::new();
    claim.read_to(&mut body).await.unwrap();
    assert_eq!(body, b"converted");

    // Work directory is cleaned up
    assert!(!fx.dir.path().join("work").join(segment.id.as_str()).exists());
}

#[tokio::test]
async fn test_engine_failure_spends_a_retry() {
    let fx = Fixture::new().await;
    let segment = fx.published().await;

    let mut engine = MockEngine::new();
    engine
        .expect_transcode()
        .times(1)
        .returning(|_, _, _| Err(MediaError::InvalidVideo("broken stream".to_string())));
    let worker = fx.worker(Arc::new(engine));

    let polled = assert_ok!(worker.poll_once(&CancellationToken::new()).await);
    assert_eq!(polled, Poll::Handled(Outcome::Failed));

    let stored = fx.registry.find_segment_by_id(&segment.id).await.unwrap();
    assert_eq!(stored.retries_count, 1);
    assert!(stored.last_error.unwrap().contains("broken stream"));
    assert!(stored.locked_by.is_none());
    assert!(stored.output_storage_claim_id.is_none());
}

#[tokio::test]
async fn test_cancelled_conversion_quits_without_spending_a_retry() {
    let fx = Fixture::new().await;
    let segment = fx.published().await;
    let worker = fx.worker(Arc::new(HangingEngine));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let polled = assert_ok!(worker.poll_once(&cancel).await);
    assert_eq!(polled, Poll::Handled(Outcome::Quit));

    let stored = fx.registry.find_segment_by_id(&segment.id).await.unwrap();
    assert_eq!(stored.state, SegmentState::Accepted);
    assert_eq!(stored.retries_count, 0);
    assert!(stored.locked_by.is_none());

    // The released segment is immediately actionable again
    let next = fx.dealer.find_free_segment(&Author::performer("w2")).await.unwrap();
    assert_eq!(next.id, segment.id);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let fx = Fixture::new().await;
    let worker = fx.worker(Arc::new(MockEngine::new()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(2), worker.run(cancel))
        .await
        .expect("worker did not stop");
}
