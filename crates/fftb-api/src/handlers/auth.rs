//! Authority and session issuing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use fftb_dealer::AuthorityIssuer;
use fftb_models::{AuthorityResponse, AuthorityRole, CreateAuthorityRequest, CreateSessionRequest, SessionResponse};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Issue an authority key for a new publisher or performer.
pub async fn create_authority(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<CreateAuthorityRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<AuthorityResponse>)> {
    let author = match request.role {
        AuthorityRole::Publisher => state.dealer.allocate_publisher_authority(&request.name).await?,
        AuthorityRole::Performer => state.dealer.allocate_performer_authority(&request.name).await?,
    };

    let authority_key = state.tokens.issue_authority_key(&author)?;
    info!(author = %author, "Issued authority");

    Ok((
        StatusCode::CREATED,
        Json(AuthorityResponse {
            name: author.name().to_string(),
            authority_key,
        }),
    ))
}

/// Exchange an authority key for a session token.
pub async fn create_session(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<CreateSessionRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let session = state.tokens.create_session(&request.authority_key)?;
    metrics::record_session_created();

    Ok((StatusCode::CREATED, Json(session)))
}
