//! HTTP client of a remote dealer against a mocked server.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fftb_dealer::{RemoteDealer, SegmentPerformer, SegmentPublisher};
use fftb_models::{
    Author, ConvertParams, ConvertSegmentPayload, CountResponse, DealerError, ErrorKind, OrderId,
    ProblemDetails, Segment, SegmentFilter, SegmentPayload, SegmentState, SessionResponse,
    StorageClaimResponse, ValidationError,
};
use fftb_storage::UniversalClient;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dealer(server: &MockServer) -> RemoteDealer {
    RemoteDealer::new(
        server.uri(),
        "authority-key",
        reqwest::Client::new(),
        Arc::new(UniversalClient::with_defaults(reqwest::Client::new())),
    )
}

fn session(token: &str) -> SessionResponse {
    SessionResponse {
        session_token: token.to_string(),
        expires_at: Utc::now() + Duration::seconds(120),
    }
}

fn segment() -> Segment {
    Segment::new(
        OrderId::from("order-1"),
        0,
        SegmentPayload::ConvertV1(ConvertSegmentPayload {
            params: ConvertParams::default(),
            muxer: "mp4".to_string(),
        }),
        Author::publisher("contracter"),
    )
}

fn problem(err: DealerError) -> ResponseTemplate {
    let (status, body) = ProblemDetails::from_error(&err);
    ResponseTemplate::new(status).set_body_json(body)
}

async fn mount_session(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(serde_json::json!({ "authority_key": "authority-key" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session(token)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_find_free_segment_uses_session() {
    let server = MockServer::start().await;
    mount_session(&server, "s1").await;

    let mut seg = segment();
    seg.state = SegmentState::Accepted;
    Mock::given(method("POST"))
        .and(path("/segments/free"))
        .and(header("authorization", "Bearer s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&seg))
        .expect(2)
        .mount(&server)
        .await;

    let dealer = dealer(&server);
    let performer = Author::performer("w1");
    assert_eq!(dealer.find_free_segment(&performer).await.unwrap(), seg);
    assert_eq!(dealer.find_free_segment(&performer).await.unwrap(), seg);

    // One session serves both calls
    let sessions = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/sessions")
        .count();
    assert_eq!(sessions, 1);
}

#[tokio::test]
async fn test_taxonomy_survives_the_wire() {
    let server = MockServer::start().await;
    mount_session(&server, "s1").await;

    Mock::given(method("POST"))
        .and(path("/segments/free"))
        .respond_with(problem(DealerError::LockTimeout))
        .mount(&server)
        .await;

    let id = segment().id;
    Mock::given(method("POST"))
        .and(path(format!("/segments/{}/actions/quit", id)))
        .respond_with(problem(DealerError::performer_mismatch("segment is locked by w2")))
        .mount(&server)
        .await;

    let mut validation = ValidationError::new();
    validation.add("state", "cannot transition from finished to published");
    Mock::given(method("POST"))
        .and(path(format!("/segments/{}/actions/publish", id)))
        .respond_with(problem(DealerError::Invalid(validation)))
        .mount(&server)
        .await;

    let dealer = dealer(&server);
    let performer = Author::performer("w1");

    let err = dealer.find_free_segment(&performer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);

    let err = dealer.quit_segment(&performer, &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PerformerMismatch);

    let err = dealer
        .publish_segment(&Author::publisher("contracter"), &id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(err.validation_fields().unwrap().contains_key("state"));
}

#[tokio::test]
async fn test_rejected_session_is_refreshed_once() {
    let server = MockServer::start().await;
    mount_session(&server, "s1").await;

    Mock::given(method("GET"))
        .and(path("/segments/queued_count"))
        .respond_with(problem(DealerError::unauthorized("session expired")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/segments/queued_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(CountResponse { count: 7 }))
        .mount(&server)
        .await;

    let dealer = dealer(&server);
    let count = dealer
        .get_queued_segments_count(&Author::publisher("contracter"))
        .await
        .unwrap();
    assert_eq!(count, 7);

    let sessions = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/sessions")
        .count();
    assert_eq!(sessions, 2);
}

#[tokio::test]
async fn test_claim_is_rebuilt_from_wire_form() {
    let server = MockServer::start().await;
    mount_session(&server, "s1").await;

    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("input_claim");
    std::fs::write(&file, b"12345").unwrap();

    let id = segment().id;
    Mock::given(method("GET"))
        .and(path(format!("/segments/{}/input_storage_claim", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(StorageClaimResponse {
            id: "input_claim".to_string(),
            url: url::Url::from_file_path(&file).unwrap().to_string(),
            size: 5,
        }))
        .mount(&server)
        .await;

    let dealer = dealer(&server);
    let claim = dealer
        .get_input_storage_claim(&Author::performer("w1"), &id)
        .await
        .unwrap();

    assert_eq!(claim.id(), "input_claim");
    assert_eq!(claim.size(), 5);

    let mut buf = Vec::new();
    claim.read_to(&mut buf).await.unwrap();
    assert_eq!(buf, b"12345");
}

#[tokio::test]
async fn test_segments_listing_sends_filter() {
    let server = MockServer::start().await;
    mount_session(&server, "s1").await;

    let mut seg = segment();
    seg.state = SegmentState::Finished;
    Mock::given(method("GET"))
        .and(path("/segments"))
        .and(query_param("order_id", "order-1"))
        .and(query_param("state", "finished"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![seg.clone()]))
        .mount(&server)
        .await;

    let dealer = dealer(&server);
    let listed = dealer
        .get_segments_by_order_id(
            &Author::publisher("contracter"),
            &OrderId::from("order-1"),
            SegmentFilter::with_state(SegmentState::Finished),
        )
        .await
        .unwrap();

    assert_eq!(listed, vec![seg]);
}

#[tokio::test]
async fn test_unreachable_dealer_is_unknown() {
    let dealer = RemoteDealer::new(
        "http://127.0.0.1:1",
        "authority-key",
        reqwest::Client::new(),
        Arc::new(UniversalClient::with_defaults(reqwest::Client::new())),
    );

    let err = dealer.find_free_segment(&Author::performer("w1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
}
