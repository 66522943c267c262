//! Segment routes for publishers and performers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use fftb_dealer::{SegmentPerformer, SegmentPublisher};
use fftb_models::{
    AllocateSegmentRequest, CancelRequest, CountResponse, DealerError, FailSegmentRequest,
    Progress, ProgressStep, Segment, SegmentId, SegmentsQuery, StorageClaimResponse,
    CANCELLATION_REASON_CANCELLED,
};
use serde_json::Value;

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn allocate_segment(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    WithRejection(Json(request), _): WithRejection<Json<AllocateSegmentRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<Segment>)> {
    let segment = state.dealer.allocate_segment(&publisher, request).await?;
    Ok((StatusCode::CREATED, Json(segment)))
}

pub async fn find_free_segment(
    State(state): State<AppState>,
    Caller(performer): Caller,
) -> ApiResult<Json<Segment>> {
    Ok(Json(state.dealer.find_free_segment(&performer).await?))
}

pub async fn list_segments(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    WithRejection(Query(query), _): WithRejection<Query<SegmentsQuery>, ApiError>,
) -> ApiResult<Json<Vec<Segment>>> {
    let segments = state
        .dealer
        .get_segments_by_order_id(&publisher, &query.order_id, query.filter())
        .await?;
    Ok(Json(segments))
}

pub async fn queued_segments_count(
    State(state): State<AppState>,
    Caller(publisher): Caller,
) -> ApiResult<Json<CountResponse>> {
    let count = state.dealer.get_queued_segments_count(&publisher).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn get_segment(
    State(state): State<AppState>,
    Caller(author): Caller,
    Path(id): Path<SegmentId>,
) -> ApiResult<Json<Segment>> {
    Ok(Json(state.dealer.get_segment_by_id(&author, &id).await?))
}

pub async fn allocate_input_storage_claim(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    Path(id): Path<SegmentId>,
) -> ApiResult<(StatusCode, Json<StorageClaimResponse>)> {
    let claim = state.dealer.allocate_input_storage_claim(&publisher, &id).await?;
    Ok((StatusCode::CREATED, Json(claim.to_response())))
}

pub async fn get_input_storage_claim(
    State(state): State<AppState>,
    Caller(performer): Caller,
    Path(id): Path<SegmentId>,
) -> ApiResult<Json<StorageClaimResponse>> {
    let claim = state.dealer.get_input_storage_claim(&performer, &id).await?;
    Ok(Json(claim.to_response()))
}

pub async fn allocate_output_storage_claim(
    State(state): State<AppState>,
    Caller(performer): Caller,
    Path(id): Path<SegmentId>,
) -> ApiResult<(StatusCode, Json<StorageClaimResponse>)> {
    let claim = state.dealer.allocate_output_storage_claim(&performer, &id).await?;
    Ok((StatusCode::CREATED, Json(claim.to_response())))
}

pub async fn get_output_storage_claim(
    State(state): State<AppState>,
    Caller(publisher): Caller,
    Path(id): Path<SegmentId>,
) -> ApiResult<Json<StorageClaimResponse>> {
    let claim = state.dealer.get_output_storage_claim(&publisher, &id).await?;
    Ok(Json(claim.to_response()))
}

/// `POST /segments/{id}/actions/{action}`.
///
/// Publisher actions: `publish`, `republish`, `cancel`, `consume`.
/// Performer actions: `finish`, `fail`, `quit`.
pub async fn segment_action(
    State(state): State<AppState>,
    Caller(author): Caller,
    Path((id, action)): Path<(SegmentId, String)>,
    body: Option<Json<Value>>,
) -> ApiResult<StatusCode> {
    let dealer = &state.dealer;
    let body = body.map(|Json(value)| value);

    match action.as_str() {
        "publish" => dealer.publish_segment(&author, &id).await?,
        "republish" => dealer.republish_segment(&author, &id).await?,
        "cancel" => {
            let request: CancelRequest = match body {
                Some(value) => parse_body(value)?,
                None => CancelRequest::default(),
            };
            let reason = request
                .reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| CANCELLATION_REASON_CANCELLED.to_string());
            dealer.cancel_segment(&author, &id, &reason).await?
        }
        "consume" => dealer.consume_segment(&author, &id).await?,
        "finish" => dealer.finish_segment(&author, &id).await?,
        "fail" => {
            let request: FailSegmentRequest = parse_body(body.ok_or(DealerError::MissingRequest)?)?;
            dealer.fail_segment(&author, &id, &request.error).await?
        }
        "quit" => dealer.quit_segment(&author, &id).await?,
        other => return Err(DealerError::not_found(format!("segment action `{}`", other)).into()),
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /segments/{id}/notify`, routed by progress step to the caller's role.
pub async fn notify_segment(
    State(state): State<AppState>,
    Caller(author): Caller,
    Path(id): Path<SegmentId>,
    WithRejection(Json(progress), _): WithRejection<Json<Progress>, ApiError>,
) -> ApiResult<StatusCode> {
    let dealer = &state.dealer;
    let progress = Progress::new(progress.step, progress.percent);

    match progress.step {
        ProgressStep::UploadingInput => dealer.notify_raw_upload(&author, &id, progress).await?,
        ProgressStep::DownloadingOutput => dealer.notify_result_download(&author, &id, progress).await?,
        ProgressStep::DownloadingInput => dealer.notify_raw_download(&author, &id, progress).await?,
        ProgressStep::Processing => dealer.notify_process(&author, &id, progress).await?,
        ProgressStep::UploadingOutput => dealer.notify_result_upload(&author, &id, progress).await?,
    }

    Ok(StatusCode::NO_CONTENT)
}

fn parse_body<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| {
        let mut validation = fftb_models::ValidationError::new();
        validation.add("body", e.to_string());
        DealerError::from(validation).into()
    })
}
