//! Authority keys and session tokens.
//!
//! An authority key is a long-lived HS256 token `{uid, iat}` handed out once
//! per publisher or performer. Callers exchange it at `POST /sessions` for a
//! short-lived session token `{uid, iat, exp}` signed with a separate secret,
//! and present that as a bearer token on every other route.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::RequestPartsExt;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use fftb_models::{Author, DealerError, DealerResult, SessionResponse};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Claims of an authority key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityClaims {
    /// Author name
    pub uid: String,
    pub iat: i64,
}

/// Claims of a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Author name
    pub uid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies both token kinds.
pub struct TokenIssuer {
    authority_encoding: EncodingKey,
    authority_decoding: DecodingKey,
    session_encoding: EncodingKey,
    session_decoding: DecodingKey,
    session_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(authority_secret: &str, session_secret: &str, session_ttl: Duration) -> Self {
        Self {
            authority_encoding: EncodingKey::from_secret(authority_secret.as_bytes()),
            authority_decoding: DecodingKey::from_secret(authority_secret.as_bytes()),
            session_encoding: EncodingKey::from_secret(session_secret.as_bytes()),
            session_decoding: DecodingKey::from_secret(session_secret.as_bytes()),
            session_ttl,
        }
    }

    /// Sign a never-expiring authority key for `author`.
    pub fn issue_authority_key(&self, author: &Author) -> DealerResult<String> {
        let claims = AuthorityClaims {
            uid: author.name().to_string(),
            iat: Utc::now().timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.authority_encoding)
            .map_err(|e| DealerError::unknown(format!("signing authority key: {}", e)))
    }

    /// Exchange an authority key for a session token.
    pub fn create_session(&self, authority_key: &str) -> DealerResult<SessionResponse> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let authority = decode::<AuthorityClaims>(authority_key, &self.authority_decoding, &validation)
            .map_err(|e| DealerError::InvalidAuthorityKey(e.to_string()))?
            .claims;

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.session_ttl)
                .map_err(|e| DealerError::unknown(format!("session ttl: {}", e)))?;
        let claims = SessionClaims {
            uid: authority.uid,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let session_token = encode(&Header::new(Algorithm::HS256), &claims, &self.session_encoding)
            .map_err(|e| DealerError::unknown(format!("signing session token: {}", e)))?;

        Ok(SessionResponse {
            session_token,
            expires_at,
        })
    }

    /// Author behind a valid, unexpired session token.
    pub fn verify_session(&self, token: &str) -> DealerResult<Author> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.session_decoding, &validation)
            .map_err(|e| DealerError::InvalidSessionKey(e.to_string()))?
            .claims;

        if claims.uid.is_empty() {
            return Err(DealerError::MissingAuthor);
        }

        Ok(Author::new(claims.uid))
    }
}

/// The authenticated author of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub Author);

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| DealerError::MissingAccessToken)?;

        let author = state.tokens.verify_session(bearer.token().trim_matches('"'))?;
        Ok(Caller(author))
    }
}
