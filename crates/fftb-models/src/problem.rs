//! Problem details (RFC 7807 style) bodies for errors crossing the wire.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{DealerError, ErrorKind, ValidationError};

/// Error body returned by the dealer HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Taxonomy title, see [`ErrorKind::title`]
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

impl ProblemDetails {
    /// Build the wire body and HTTP status for an error.
    pub fn from_error(err: &DealerError) -> (u16, Self) {
        let kind = err.kind();

        let problem = Self {
            problem_type: problem_type(kind),
            title: kind.title().to_string(),
            detail: err.to_string(),
            fields: err.validation_fields().cloned(),
        };

        (kind.http_status(), problem)
    }

    /// Body for an internal error with details hidden.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            problem_type: problem_type(ErrorKind::Unknown),
            title: ErrorKind::Unknown.title().to_string(),
            detail: detail.into(),
            fields: None,
        }
    }

    /// Map a received body back into the taxonomy.
    ///
    /// Unknown titles on client-error statuses stay `Unknown`; a 404 is
    /// always `NotFound`.
    pub fn into_error(self, status: u16) -> DealerError {
        let kind = match (status, ErrorKind::from_title(&self.title)) {
            (404, Some(kind)) if kind.http_status() == 404 => kind,
            (404, _) => ErrorKind::NotFound,
            (401 | 422, Some(kind)) => kind,
            _ => ErrorKind::Unknown,
        };

        let context = format!("HTTP {} - {}", status, self.detail);

        match kind {
            ErrorKind::Invalid => {
                DealerError::Invalid(ValidationError::from_fields(self.fields.unwrap_or_default()))
                    .context(context)
            }
            ErrorKind::Unknown => DealerError::unknown(context),
            other => DealerError::from_kind(other, self.detail).context(context),
        }
    }
}

fn problem_type(kind: ErrorKind) -> String {
    format!("urn:fftb:error:{}", kind.title().to_lowercase().replace(' ', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_fields_round_trip() {
        let mut validation = ValidationError::new();
        validation.add("muxer", "is required");
        let err = DealerError::from(validation).context("allocating segment");

        let (status, problem) = ProblemDetails::from_error(&err);
        assert_eq!(status, 422);
        assert_eq!(problem.title, "Invalid");

        let back = problem.into_error(status);
        assert_eq!(back.kind(), ErrorKind::Invalid);
        assert_eq!(back.validation_fields().unwrap()["muxer"], "is required");
    }

    #[test]
    fn test_known_titles_are_restored() {
        let (status, problem) = ProblemDetails::from_error(&DealerError::performer_mismatch("x"));
        assert_eq!(status, 401);
        assert_eq!(problem.into_error(status).kind(), ErrorKind::PerformerMismatch);

        let (status, problem) = ProblemDetails::from_error(&DealerError::LockTimeout);
        assert_eq!(problem.into_error(status).kind(), ErrorKind::LockTimeout);
    }

    #[test]
    fn test_server_errors_become_unknown() {
        let problem = ProblemDetails::internal("database exploded");
        assert_eq!(problem.into_error(500).kind(), ErrorKind::Unknown);

        let (_, problem) = ProblemDetails::from_error(&DealerError::LockTimeout);
        assert_eq!(problem.into_error(503).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_not_found() {
        let (status, problem) = ProblemDetails::from_error(&DealerError::not_found("segment s1"));
        assert_eq!(status, 404);
        assert_eq!(problem.into_error(404).kind(), ErrorKind::NotFound);
    }
}
