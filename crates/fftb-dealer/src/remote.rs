//! HTTP client for a dealer served by `fftb-api`.
//!
//! The caller identity comes from the session token exchanged for the
//! configured authority key, so the `Author` arguments of the dealer traits
//! are not sent over the wire.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use fftb_models::{
    AllocateSegmentRequest, Author, CancelRequest, CountResponse, CreateSessionRequest,
    DealerError, DealerResult, ErrorKind, FailSegmentRequest, OrderId, ProblemDetails, Progress,
    ProgressStep, ResultExt, Segment, SegmentFilter, SegmentId, SegmentsQuery, SessionResponse,
    StorageClaimResponse,
};
use fftb_storage::{StorageClaim, StorageClient};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::dealer::{SegmentPerformer, SegmentPublisher};

/// Sessions are refreshed this long before they expire.
const SESSION_REFRESH_MARGIN_SECS: i64 = 10;

/// Dealer reached over HTTP.
pub struct RemoteDealer {
    base_url: String,
    authority_key: String,
    http: reqwest::Client,
    storage: Arc<dyn StorageClient>,
    session: RwLock<Option<SessionResponse>>,
}

impl RemoteDealer {
    pub fn new(
        base_url: impl Into<String>,
        authority_key: impl Into<String>,
        http: reqwest::Client,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authority_key: authority_key.into(),
            http,
            storage,
            session: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Current session token, creating a session when missing or expiring.
    async fn session_token(&self) -> DealerResult<String> {
        let fresh_until = Utc::now() + Duration::seconds(SESSION_REFRESH_MARGIN_SECS);

        if let Some(session) = self.session.read().await.as_ref() {
            if session.expires_at > fresh_until {
                return Ok(session.session_token.clone());
            }
        }

        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            if session.expires_at > fresh_until {
                return Ok(session.session_token.clone());
            }
        }

        let response = self
            .http
            .post(self.url("sessions"))
            .json(&CreateSessionRequest {
                authority_key: self.authority_key.clone(),
            })
            .send()
            .await
            .map_err(transport_error)
            .context("creating session")?;

        let session: SessionResponse = parse_response(response).await.context("creating session")?;
        debug!(expires_at = %session.expires_at, "Created dealer session");

        let token = session.session_token.clone();
        *slot = Some(session);
        Ok(token)
    }

    async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    /// Send an authorized request, refreshing the session once on 401.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        query: Option<&[(&str, String)]>,
    ) -> DealerResult<reqwest::Response> {
        let mut retried = false;

        loop {
            let token = self.session_token().await?;

            let mut request = self
                .http
                .request(method.clone(), self.url(path))
                .bearer_auth(token);
            if let Some(body) = &body {
                request = request.json(body);
            }
            if let Some(query) = query {
                request = request.query(query);
            }

            let response = request.send().await.map_err(transport_error)?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            // Ownership errors share the status with session errors
            let text = response.text().await.unwrap_or_default();
            let err = error_from_body(StatusCode::UNAUTHORIZED, &text);
            if retried || !is_session_error(err.kind()) {
                return Err(err);
            }

            warn!(path = %path, "Session rejected, refreshing");
            self.invalidate_session().await;
            retried = true;
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> DealerResult<T> {
        let response = self.send(method, path, body, None).await?;
        parse_response(response).await
    }

    async fn call_empty(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> DealerResult<()> {
        let response = self.send(method, path, body, None).await?;
        check_response(response).await.map(|_| ())
    }

    async fn claim(&self, method: Method, path: &str) -> DealerResult<Box<dyn StorageClaim>> {
        let wire: StorageClaimResponse = self.call(method, path, None).await?;
        let url = Url::parse(&wire.url)
            .map_err(|e| DealerError::unknown(format!("invalid claim url `{}`: {}", wire.url, e)))?;

        Ok(self.storage.claim_from_parts(&wire.id, &url, wire.size)?)
    }

    async fn action(&self, id: &SegmentId, action: &str, body: Option<serde_json::Value>) -> DealerResult<()> {
        self.call_empty(Method::POST, &format!("segments/{}/actions/{}", id, action), body)
            .await
            .with_context(|| format!("{} segment `{}`", action, id))
    }

    async fn notify(&self, id: &SegmentId, step: ProgressStep, progress: Progress) -> DealerResult<()> {
        let body = to_body(&Progress::new(step, progress.percent))?;
        self.call_empty(Method::POST, &format!("segments/{}/notify", id), Some(body))
            .await
    }
}

fn to_body<T: Serialize>(value: &T) -> DealerResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

fn transport_error(err: reqwest::Error) -> DealerError {
    DealerError::unknown(format!("dealer request failed: {}", err))
}

/// Map a non-success response to the error taxonomy.
async fn check_response(response: reqwest::Response) -> DealerResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

fn error_from_body(status: StatusCode, body: &str) -> DealerError {
    match serde_json::from_str::<ProblemDetails>(body) {
        Ok(problem) => problem.into_error(status.as_u16()),
        Err(_) if status == StatusCode::NOT_FOUND => DealerError::not_found(format!("HTTP 404 - {}", body)),
        Err(_) => DealerError::unknown(format!("HTTP {} - {}", status.as_u16(), body)),
    }
}

fn is_session_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Unauthorized | ErrorKind::InvalidSessionKey | ErrorKind::MissingAccessToken
    )
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> DealerResult<T> {
    let response = check_response(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| DealerError::unknown(format!("invalid dealer response: {}", e)))
}

#[async_trait]
impl SegmentPublisher for RemoteDealer {
    async fn allocate_segment(
        &self,
        _publisher: &Author,
        request: AllocateSegmentRequest,
    ) -> DealerResult<Segment> {
        self.call(Method::POST, "segments", Some(to_body(&request)?))
            .await
            .context("allocating segment")
    }

    async fn allocate_input_storage_claim(
        &self,
        _publisher: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        self.claim(Method::POST, &format!("segments/{}/input_storage_claim", id))
            .await
            .context("allocating input storage claim")
    }

    async fn get_output_storage_claim(
        &self,
        _publisher: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        self.claim(Method::GET, &format!("segments/{}/output_storage_claim", id))
            .await
            .context("getting output storage claim")
    }

    async fn publish_segment(&self, _publisher: &Author, id: &SegmentId) -> DealerResult<()> {
        self.action(id, "publish", None).await
    }

    async fn republish_segment(&self, _publisher: &Author, id: &SegmentId) -> DealerResult<()> {
        self.action(id, "republish", None).await
    }

    async fn cancel_segment(&self, _publisher: &Author, id: &SegmentId, reason: &str) -> DealerResult<()> {
        let body = to_body(&CancelRequest {
            reason: Some(reason.to_string()),
        })?;
        self.action(id, "cancel", Some(body)).await
    }

    async fn consume_segment(&self, _publisher: &Author, id: &SegmentId) -> DealerResult<()> {
        self.action(id, "consume", None).await
    }

    async fn get_segment_by_id(&self, _author: &Author, id: &SegmentId) -> DealerResult<Segment> {
        self.call(Method::GET, &format!("segments/{}", id), None).await
    }

    async fn get_segments_by_order_id(
        &self,
        _publisher: &Author,
        order_id: &OrderId,
        filter: SegmentFilter,
    ) -> DealerResult<Vec<Segment>> {
        let query = SegmentsQuery {
            order_id: order_id.clone(),
            state: filter.state,
        };
        let mut pairs = vec![("order_id", query.order_id.to_string())];
        if let Some(state) = query.state {
            pairs.push(("state", state.as_str().to_string()));
        }

        let response = self.send(Method::GET, "segments", None, Some(pairs.as_slice())).await?;
        parse_response(response).await.context("listing order segments")
    }

    async fn get_queued_segments_count(&self, _publisher: &Author) -> DealerResult<usize> {
        let count: CountResponse = self.call(Method::GET, "segments/queued_count", None).await?;
        Ok(count.count)
    }

    async fn notify_raw_upload(&self, _publisher: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.notify(id, ProgressStep::UploadingInput, progress).await
    }

    async fn notify_result_download(
        &self,
        _publisher: &Author,
        id: &SegmentId,
        progress: Progress,
    ) -> DealerResult<()> {
        self.notify(id, ProgressStep::DownloadingOutput, progress).await
    }
}

#[async_trait]
impl SegmentPerformer for RemoteDealer {
    async fn find_free_segment(&self, _performer: &Author) -> DealerResult<Segment> {
        self.call(Method::POST, "segments/free", None).await
    }

    async fn get_input_storage_claim(
        &self,
        _performer: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        self.claim(Method::GET, &format!("segments/{}/input_storage_claim", id))
            .await
            .context("getting input storage claim")
    }

    async fn allocate_output_storage_claim(
        &self,
        _performer: &Author,
        id: &SegmentId,
    ) -> DealerResult<Box<dyn StorageClaim>> {
        self.claim(Method::POST, &format!("segments/{}/output_storage_claim", id))
            .await
            .context("allocating output storage claim")
    }

    async fn notify_raw_download(&self, _performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.notify(id, ProgressStep::DownloadingInput, progress).await
    }

    async fn notify_process(&self, _performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.notify(id, ProgressStep::Processing, progress).await
    }

    async fn notify_result_upload(&self, _performer: &Author, id: &SegmentId, progress: Progress) -> DealerResult<()> {
        self.notify(id, ProgressStep::UploadingOutput, progress).await
    }

    async fn finish_segment(&self, _performer: &Author, id: &SegmentId) -> DealerResult<()> {
        self.action(id, "finish", None).await
    }

    async fn fail_segment(&self, _performer: &Author, id: &SegmentId, error: &str) -> DealerResult<()> {
        let body = to_body(&FailSegmentRequest {
            error: error.to_string(),
        })?;
        self.action(id, "fail", Some(body)).await
    }

    async fn quit_segment(&self, _performer: &Author, id: &SegmentId) -> DealerResult<()> {
        self.action(id, "quit", None).await
    }
}
