//! Router behavior end to end, over a file registry and local storage.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use fftb_api::{create_router, ApiConfig, AppState};
use fftb_dealer::ContracterConfig;
use fftb_media::{FfmpegEngine, MediaConfig};
use fftb_models::{ProblemDetails, Segment, StorageClaimResponse};
use fftb_registry::{FileStore, Registry};
use fftb_storage::{LocalStorageController, UniversalClient};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("registry.json")).await.unwrap());
        let storage = Arc::new(LocalStorageController::new(dir.path().join("storage")).unwrap());

        let config = ApiConfig {
            authority_secret: "authority-secret".to_string(),
            session_secret: "session-secret".to_string(),
            ..ApiConfig::default()
        };

        let state = AppState::new(
            config,
            Registry::new(store),
            storage,
            Arc::new(UniversalClient::with_defaults(reqwest::Client::new())),
            Arc::new(FfmpegEngine::new(MediaConfig::default())),
            ContracterConfig::default()
                .with_tmp_dir(dir.path().join("tmp"))
                .with_files_root(dir.path().join("files")),
        );

        Self {
            router: create_router(state, None),
            _dir: dir,
        }
    }

    async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }

    /// Issue an authority and exchange it for a session token.
    async fn login(&self, role: &str, name: &str) -> String {
        let (status, authority) = self
            .request(Method::POST, "/authorities", None, Some(json!({ "name": name, "role": role })))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, session) = self
            .request(
                Method::POST,
                "/sessions",
                None,
                Some(json!({ "authority_key": authority["authority_key"] })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        session["session_token"].as_str().unwrap().to_string()
    }

    /// Allocate, upload and publish one segment as `publisher`.
    async fn published_segment(&self, publisher: &str) -> Segment {
        let (status, segment) = self
            .request(
                Method::POST,
                "/segments",
                Some(publisher),
                Some(json!({ "type": "convert/v1", "order_id": "order-1", "position": 0, "muxer": "mp4" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let segment: Segment = serde_json::from_value(segment).unwrap();

        let uri = format!("/segments/{}/input_storage_claim", segment.id);
        let (status, claim) = self.request(Method::POST, &uri, Some(publisher), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let claim: StorageClaimResponse = serde_json::from_value(claim).unwrap();
        let path = url::Url::parse(&claim.url).unwrap().to_file_path().unwrap();
        std::fs::write(path, b"raw").unwrap();

        let uri = format!("/segments/{}/actions/publish", segment.id);
        let (status, _) = self.request(Method::POST, &uri, Some(publisher), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        segment
    }
}

fn problem(body: Value) -> ProblemDetails {
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn test_health_carries_request_id_and_security_headers() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let (status, body) = app.request(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["registry"]["backend"], "file");
}

#[tokio::test]
async fn test_routes_require_a_session() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::POST, "/segments/free", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem(body).title, "Missing access token");

    let (status, body) = app.request(Method::POST, "/segments/free", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem(body).title, "Invalid session key");
}

#[tokio::test]
async fn test_bad_authority_key_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(Method::POST, "/sessions", None, Some(json!({ "authority_key": "nope" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem(body).title, "Invalid authority key");
}

#[tokio::test]
async fn test_segment_lifecycle_over_http() {
    let app = TestApp::new().await;
    let publisher = app.login("publisher", "contracter").await;
    let w1 = app.login("performer", "w1").await;
    let w2 = app.login("performer", "w2").await;

    let segment = app.published_segment(&publisher).await;

    let (status, body) = app.request(Method::GET, "/segments/queued_count", Some(&publisher), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, locked) = app.request(Method::POST, "/segments/free", Some(&w1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(locked["id"], segment.id.as_str());
    assert_eq!(locked["state"], "accepted");

    // Nothing left for the second performer
    let (status, body) = app.request(Method::POST, "/segments/free", Some(&w2), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(problem(body).title, "Not found");

    let finish = format!("/segments/{}/actions/finish", segment.id);
    let (status, body) = app.request(Method::POST, &finish, Some(&w2), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem(body).title, "Performer mismatch");

    let notify = format!("/segments/{}/notify", segment.id);
    let (status, _) = app
        .request(Method::POST, &notify, Some(&w1), Some(json!({ "step": "processing", "percent": 0.5 })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let input = format!("/segments/{}/input_storage_claim", segment.id);
    let (status, claim) = app.request(Method::GET, &input, Some(&w1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(claim["id"].as_str().unwrap().starts_with("input_"));

    let output = format!("/segments/{}/output_storage_claim", segment.id);
    let (status, claim) = app.request(Method::POST, &output, Some(&w1), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let claim: StorageClaimResponse = serde_json::from_value(claim).unwrap();
    let path = url::Url::parse(&claim.url).unwrap().to_file_path().unwrap();
    std::fs::write(path, b"converted").unwrap();

    let (status, _) = app.request(Method::POST, &finish, Some(&w1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let listing = "/segments?order_id=order-1&state=finished";
    let (status, body) = app.request(Method::GET, listing, Some(&publisher), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app.request(Method::GET, &output, Some(&publisher), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], claim.id);
}

#[tokio::test]
async fn test_fail_action_requires_a_body() {
    let app = TestApp::new().await;
    let publisher = app.login("publisher", "contracter").await;
    let w1 = app.login("performer", "w1").await;
    let segment = app.published_segment(&publisher).await;
    app.request(Method::POST, "/segments/free", Some(&w1), None).await;

    let fail = format!("/segments/{}/actions/fail", segment.id);
    let (status, body) = app.request(Method::POST, &fail, Some(&w1), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem(body).title, "Missing request");

    let (status, _) = app
        .request(Method::POST, &fail, Some(&w1), Some(json!({ "error": "ffmpeg exited 1" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let uri = format!("/segments/{}", segment.id);
    let (_, body) = app.request(Method::GET, &uri, Some(&publisher), None).await;
    assert_eq!(body["retries_count"], 1);
    assert_eq!(body["last_error"], "ffmpeg exited 1");

    let unknown = format!("/segments/{}/actions/explode", segment.id);
    let (status, _) = app.request(Method::POST, &unknown, Some(&publisher), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_allocation_errors_use_problem_details() {
    let app = TestApp::new().await;
    let publisher = app.login("publisher", "contracter").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/segments",
            Some(&publisher),
            Some(json!({ "type": "transcribe/v1", "order_id": "o", "position": 0, "muxer": "mp4" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(problem(body).title, "Unknown type");

    let (status, body) = app
        .request(Method::POST, "/segments", Some(&publisher), Some(json!({ "position": "zero" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let problem = problem(body);
    assert_eq!(problem.title, "Invalid");
    assert!(problem.fields.unwrap().contains_key("body"));
}

#[tokio::test]
async fn test_orders_are_scoped_to_their_publisher() {
    let app = TestApp::new().await;
    let alice = app.login("publisher", "alice").await;
    let bob = app.login("publisher", "bob").await;

    let (status, order) = app
        .request(
            Method::POST,
            "/orders",
            Some(&alice),
            Some(json!({ "type": "convert/v1", "in_file": "in/a.mkv", "out_file": "out/a.mp4" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["state"], "queued");
    let id = order["id"].as_str().unwrap().to_string();

    let (status, body) = app.request(Method::GET, &format!("/orders/{}", id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem(body).title, "Publisher mismatch");

    let (_, listed) = app.request(Method::GET, "/orders", Some(&bob), None).await;
    assert!(listed.as_array().unwrap().is_empty());

    let (status, view) = app.request(Method::GET, &format!("/orders/{}", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["progress"], 0.0);

    let cancel = format!("/orders/{}/actions/cancel", id);
    let (status, cancelled) = app
        .request(Method::POST, &cancel, Some(&alice), Some(json!({ "reason": "changed my mind" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["state"], "cancelled");
    assert_eq!(cancelled["cancellation_reason"], "changed my mind");
}

#[tokio::test]
async fn test_authority_names_are_not_reissued() {
    let app = TestApp::new().await;
    let alice = app.login("publisher", "alice").await;

    let (status, order) = app
        .request(
            Method::POST,
            "/orders",
            Some(&alice),
            Some(json!({ "type": "convert/v1", "in_file": "in/a.mkv", "out_file": "out/a.mp4" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(
            Method::POST,
            "/authorities",
            None,
            Some(json!({ "name": "alice", "role": "publisher" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let problem = problem(body);
    assert_eq!(problem.title, "Invalid");
    assert!(problem.fields.unwrap().contains_key("name"));

    let uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let (status, view) = app.request(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "queued");
}

#[tokio::test]
async fn test_order_files_stay_under_the_files_root() {
    let app = TestApp::new().await;
    let publisher = app.login("publisher", "alice").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/orders",
            Some(&publisher),
            Some(json!({ "type": "convert/v1", "in_file": "/etc/passwd.mkv", "out_file": "../../a.mp4" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let problem = problem(body);
    assert_eq!(problem.title, "Invalid");
    let fields = problem.fields.unwrap();
    assert!(fields.contains_key("in_file"));
    assert!(fields.contains_key("out_file"));

    let (_, listed) = app.request(Method::GET, "/orders", Some(&publisher), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}
