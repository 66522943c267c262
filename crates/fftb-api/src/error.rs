//! API error types.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fftb_models::{DealerError, ErrorKind, ProblemDetails, ValidationError};
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dealer(#[from] DealerError),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Taxonomy member this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Dealer(e) => e.kind(),
            ApiError::RateLimited | ApiError::Internal(_) => ErrorKind::Unknown,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut validation = ValidationError::new();
        validation.add("body", rejection.body_text());
        Self::Dealer(DealerError::from(validation))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let mut validation = ValidationError::new();
        validation.add("query", rejection.body_text());
        Self::Dealer(DealerError::from(validation))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, problem) = match &self {
            ApiError::Dealer(e) if e.kind() != ErrorKind::Unknown => {
                let (status, problem) = ProblemDetails::from_error(e);
                (
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    problem,
                )
            }
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ProblemDetails {
                    problem_type: "urn:fftb:error:rate-limited".to_string(),
                    title: "Rate limited".to_string(),
                    detail: "Rate limit exceeded. Please try again later.".to_string(),
                    fields: None,
                },
            ),
            _ => {
                error!(error = %self, "Request failed");

                // Don't expose internal error details in production
                let detail = if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, ProblemDetails::internal(detail))
            }
        };

        (status, Json(problem)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_taxonomy() {
        let cases = [
            (DealerError::not_found("segment s1"), StatusCode::NOT_FOUND),
            (DealerError::performer_mismatch("w2"), StatusCode::UNAUTHORIZED),
            (DealerError::LockTimeout, StatusCode::UNPROCESSABLE_ENTITY),
            (DealerError::unknown_type("x/v9"), StatusCode::UNPROCESSABLE_ENTITY),
            (DealerError::unknown("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
