//! Registry behavior over the file store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fftb_models::{
    Author, ConvertOrderPayload, ConvertParams, ConvertSegmentPayload, Order, OrderId,
    OrderPayload, OrderState, Segment, SegmentPayload, SegmentState,
};
use fftb_registry::{segment_key, FileStore, KvStore, Registry, RegistryError};
use tempfile::TempDir;

async fn registry(dir: &TempDir) -> (Registry, Arc<FileStore>) {
    let store = Arc::new(FileStore::open(dir.path().join("registry.json")).await.unwrap());
    (Registry::new(store.clone()), store)
}

fn order() -> Order {
    Order::new(
        OrderPayload::ConvertV1(ConvertOrderPayload {
            params: ConvertParams {
                video_codec: "h264".to_string(),
                video_quality: 23,
                ..Default::default()
            },
            in_file: "/in/movie.mkv".to_string(),
            out_file: "/out/movie.mp4".to_string(),
        }),
        Author::new("v1/publishers/local"),
    )
}

fn segment(order_id: &OrderId, position: u32) -> Segment {
    Segment::new(
        order_id.clone(),
        position,
        SegmentPayload::ConvertV1(ConvertSegmentPayload {
            params: ConvertParams::default(),
            muxer: "mp4".to_string(),
        }),
        Author::new("v1/publishers/local"),
    )
}

#[tokio::test]
async fn test_segment_round_trip_keeps_every_field() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry(&dir).await;

    let now = Utc::now();
    let mut seg = segment(&OrderId::from("order-1"), 3);
    seg.state = SegmentState::Accepted;
    seg.input_storage_claim_id = Some("in-claim".to_string());
    seg.output_storage_claim_id = Some("out-claim".to_string());
    seg.locked_by = Some(Author::new("v1/performers/w1"));
    seg.locked_until = Some(now + Duration::seconds(60));
    seg.retries_count = 2;
    seg.retry_at = Some(now - Duration::seconds(1));
    seg.last_error = Some("ffmpeg exited".to_string());

    registry.persist_segment(&seg).await.unwrap();
    let loaded = registry.find_segment_by_id(&seg.id).await.unwrap();
    assert_eq!(loaded, seg);

    // Nullable timestamps survive as null
    let fresh = segment(&OrderId::from("order-1"), 0);
    registry.persist_segment(&fresh).await.unwrap();
    let loaded = registry.find_segment_by_id(&fresh.id).await.unwrap();
    assert!(loaded.locked_until.is_none());
    assert!(loaded.retry_at.is_none());
}

#[tokio::test]
async fn test_order_round_trip() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry(&dir).await;

    let mut order = order();
    order.state = OrderState::InProgress;
    order.segment_ids = vec!["s1".into(), "s2".into()];

    registry.persist_order(&order).await.unwrap();
    assert_eq!(registry.find_order_by_id(&order.id).await.unwrap(), order);
}

#[tokio::test]
async fn test_persist_rejects_invalid_records() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry(&dir).await;

    let mut seg = segment(&OrderId::from("order-1"), 0);
    seg.state = SegmentState::Published;

    let err = registry.persist_segment(&seg).await.unwrap_err();
    assert!(matches!(err, RegistryError::Invalid(_)));
    assert!(registry.find_segment_by_id(&seg.id).await.is_err());
}

#[tokio::test]
async fn test_object_type_is_checked() {
    let dir = TempDir::new().unwrap();
    let (registry, store) = registry(&dir).await;

    let order = order();
    registry.persist_order(&order).await.unwrap();

    // An order record placed under a segment key must not decode as a segment
    let raw = store.get(&fftb_registry::order_key(&order.id)).await.unwrap();
    let fake_id = "fake".into();
    store.set(&segment_key(&fake_id), raw).await.unwrap();

    let err = registry.find_segment_by_id(&fake_id).await.unwrap_err();
    assert!(matches!(err, RegistryError::UnexpectedObjectType { .. }));

    // Search skips it
    assert!(registry.search_all_segments(|_| true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_segments_by_order_id_sorted_by_position() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry(&dir).await;

    let order_id = OrderId::from("order-1");
    for position in [2, 0, 1] {
        registry.persist_segment(&segment(&order_id, position)).await.unwrap();
    }
    registry
        .persist_segment(&segment(&OrderId::from("other"), 0))
        .await
        .unwrap();

    let segments = registry.find_segments_by_order_id(&order_id).await.unwrap();
    let positions: Vec<u32> = segments.iter().map(|s| s.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_search_and_destroy() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry(&dir).await;

    let seg = segment(&OrderId::from("order-1"), 0);
    registry.persist_segment(&seg).await.unwrap();

    let found = registry.search_segment(|s| s.position == 0).await.unwrap();
    assert_eq!(found.id, seg.id);

    let missing = registry.search_segment(|s| s.position == 7).await.unwrap_err();
    assert!(missing.is_not_found());

    registry.destroy_segment(&seg.id).await.unwrap();
    assert!(registry
        .find_segment_by_id(&seg.id)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let order = order();

    {
        let (registry, _) = registry(&dir).await;
        registry.persist_order(&order).await.unwrap();
        registry.persist().await.unwrap();
    }

    let (registry, _) = registry(&dir).await;
    let orders = registry.search_all_orders(|_| true).await.unwrap();
    assert_eq!(orders, vec![order]);
}

#[tokio::test]
async fn test_author_names_register_once() {
    let dir = TempDir::new().unwrap();
    let (registry, _) = registry(&dir).await;
    let alice = Author::publisher("alice").with_authority_key("key-a");

    assert!(registry.register_author(&alice).await.unwrap());
    assert!(!registry.register_author(&Author::publisher("alice")).await.unwrap());

    // Same name under the other role is a different author
    assert!(registry.register_author(&Author::performer("alice")).await.unwrap());

    let stored = registry.find_author(alice.name()).await.unwrap();
    assert_eq!(stored, alice);
    assert!(stored.authority_key.is_none());
    assert!(registry.search_all_orders(|_| true).await.unwrap().is_empty());
}
