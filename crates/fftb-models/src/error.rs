//! Dealer error taxonomy.
//!
//! Every fallible dealer operation returns [`DealerError`]. Errors can be
//! wrapped with operation context via [`ResultExt`] without losing the root
//! cause: [`DealerError::kind`] always reports the innermost taxonomy member.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for dealer operations.
pub type DealerResult<T> = Result<T, DealerError>;

/// Errors produced by the dealer, contracter and their collaborators.
#[derive(Debug, Error)]
pub enum DealerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Unknown storage claim type: {0}")]
    UnknownStorageClaimType(String),

    #[error("Missing storage claim: {0}")]
    MissingStorageClaim(String),

    #[error("Storage claim already allocated: {0}")]
    StorageClaimAlreadyAllocated(String),

    #[error("Missing request")]
    MissingRequest,

    #[error("Timeout reached")]
    TimeoutReached,

    #[error("Lock timeout reached")]
    LockTimeout,

    #[error("Missing lock author")]
    MissingLockAuthor,

    #[error("Segment is locked: {0}")]
    SegmentIsLocked(String),

    #[error("Missing segment")]
    MissingSegment,

    #[error("Missing order")]
    MissingOrder,

    #[error("Missing publisher")]
    MissingPublisher,

    #[error("Missing performer")]
    MissingPerformer,

    #[error("Missing author")]
    MissingAuthor,

    #[error("Performer mismatch: {0}")]
    PerformerMismatch(String),

    #[error("Publisher mismatch: {0}")]
    PublisherMismatch(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid authority key: {0}")]
    InvalidAuthorityKey(String),

    #[error("Invalid session key: {0}")]
    InvalidSessionKey(String),

    #[error("Missing access token")]
    MissingAccessToken,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DealerError>,
    },
}

/// Flat discriminant of [`DealerError`], stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unknown,
    Invalid,
    UnknownType,
    NotImplemented,
    UnknownStorageClaimType,
    MissingStorageClaim,
    StorageClaimAlreadyAllocated,
    MissingRequest,
    TimeoutReached,
    LockTimeout,
    MissingLockAuthor,
    SegmentIsLocked,
    MissingSegment,
    MissingOrder,
    MissingPublisher,
    MissingPerformer,
    MissingAuthor,
    PerformerMismatch,
    PublisherMismatch,
    Unauthorized,
    InvalidAuthorityKey,
    InvalidSessionKey,
    MissingAccessToken,
}

const ALL_KINDS: [ErrorKind; 24] = [
    ErrorKind::NotFound,
    ErrorKind::Unknown,
    ErrorKind::Invalid,
    ErrorKind::UnknownType,
    ErrorKind::NotImplemented,
    ErrorKind::UnknownStorageClaimType,
    ErrorKind::MissingStorageClaim,
    ErrorKind::StorageClaimAlreadyAllocated,
    ErrorKind::MissingRequest,
    ErrorKind::TimeoutReached,
    ErrorKind::LockTimeout,
    ErrorKind::MissingLockAuthor,
    ErrorKind::SegmentIsLocked,
    ErrorKind::MissingSegment,
    ErrorKind::MissingOrder,
    ErrorKind::MissingPublisher,
    ErrorKind::MissingPerformer,
    ErrorKind::MissingAuthor,
    ErrorKind::PerformerMismatch,
    ErrorKind::PublisherMismatch,
    ErrorKind::Unauthorized,
    ErrorKind::InvalidAuthorityKey,
    ErrorKind::InvalidSessionKey,
    ErrorKind::MissingAccessToken,
];

impl ErrorKind {
    /// Stable title used in problem details bodies.
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "Not found",
            ErrorKind::Unknown => "Unknown error",
            ErrorKind::Invalid => "Invalid",
            ErrorKind::UnknownType => "Unknown type",
            ErrorKind::NotImplemented => "Not implemented",
            ErrorKind::UnknownStorageClaimType => "Unknown storage claim type",
            ErrorKind::MissingStorageClaim => "Missing storage claim",
            ErrorKind::StorageClaimAlreadyAllocated => "Storage claim already allocated",
            ErrorKind::MissingRequest => "Missing request",
            ErrorKind::TimeoutReached => "Timeout reached",
            ErrorKind::LockTimeout => "Lock timeout reached",
            ErrorKind::MissingLockAuthor => "Missing lock author",
            ErrorKind::SegmentIsLocked => "Segment is locked",
            ErrorKind::MissingSegment => "Missing segment",
            ErrorKind::MissingOrder => "Missing order",
            ErrorKind::MissingPublisher => "Missing publisher",
            ErrorKind::MissingPerformer => "Missing performer",
            ErrorKind::MissingAuthor => "Missing author",
            ErrorKind::PerformerMismatch => "Performer mismatch",
            ErrorKind::PublisherMismatch => "Publisher mismatch",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::InvalidAuthorityKey => "Invalid authority key",
            ErrorKind::InvalidSessionKey => "Invalid session key",
            ErrorKind::MissingAccessToken => "Missing access token",
        }
    }

    /// Reverse of [`ErrorKind::title`].
    pub fn from_title(title: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|kind| kind.title() == title)
    }

    /// HTTP status used when this error crosses the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound
            | ErrorKind::MissingSegment
            | ErrorKind::MissingOrder
            | ErrorKind::MissingStorageClaim => 404,

            ErrorKind::Unauthorized
            | ErrorKind::MissingAuthor
            | ErrorKind::MissingPublisher
            | ErrorKind::MissingPerformer
            | ErrorKind::PerformerMismatch
            | ErrorKind::PublisherMismatch
            | ErrorKind::InvalidAuthorityKey
            | ErrorKind::InvalidSessionKey
            | ErrorKind::MissingAccessToken => 401,

            ErrorKind::Invalid
            | ErrorKind::UnknownType
            | ErrorKind::UnknownStorageClaimType
            | ErrorKind::StorageClaimAlreadyAllocated
            | ErrorKind::MissingRequest
            | ErrorKind::MissingLockAuthor
            | ErrorKind::SegmentIsLocked
            | ErrorKind::LockTimeout
            | ErrorKind::TimeoutReached => 422,

            ErrorKind::Unknown | ErrorKind::NotImplemented => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl DealerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    pub fn unknown_type(kind: impl Into<String>) -> Self {
        Self::UnknownType(kind.into())
    }

    pub fn performer_mismatch(msg: impl Into<String>) -> Self {
        Self::PerformerMismatch(msg.into())
    }

    pub fn publisher_mismatch(msg: impl Into<String>) -> Self {
        Self::PublisherMismatch(msg.into())
    }

    pub fn missing_storage_claim(msg: impl Into<String>) -> Self {
        Self::MissingStorageClaim(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Wrap this error with operation context.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping every context wrapper.
    pub fn root(&self) -> &DealerError {
        match self {
            DealerError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Taxonomy member of the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            DealerError::NotFound(_) => ErrorKind::NotFound,
            DealerError::Unknown(_) => ErrorKind::Unknown,
            DealerError::Invalid(_) => ErrorKind::Invalid,
            DealerError::UnknownType(_) => ErrorKind::UnknownType,
            DealerError::NotImplemented(_) => ErrorKind::NotImplemented,
            DealerError::UnknownStorageClaimType(_) => ErrorKind::UnknownStorageClaimType,
            DealerError::MissingStorageClaim(_) => ErrorKind::MissingStorageClaim,
            DealerError::StorageClaimAlreadyAllocated(_) => {
                ErrorKind::StorageClaimAlreadyAllocated
            }
            DealerError::MissingRequest => ErrorKind::MissingRequest,
            DealerError::TimeoutReached => ErrorKind::TimeoutReached,
            DealerError::LockTimeout => ErrorKind::LockTimeout,
            DealerError::MissingLockAuthor => ErrorKind::MissingLockAuthor,
            DealerError::SegmentIsLocked(_) => ErrorKind::SegmentIsLocked,
            DealerError::MissingSegment => ErrorKind::MissingSegment,
            DealerError::MissingOrder => ErrorKind::MissingOrder,
            DealerError::MissingPublisher => ErrorKind::MissingPublisher,
            DealerError::MissingPerformer => ErrorKind::MissingPerformer,
            DealerError::MissingAuthor => ErrorKind::MissingAuthor,
            DealerError::PerformerMismatch(_) => ErrorKind::PerformerMismatch,
            DealerError::PublisherMismatch(_) => ErrorKind::PublisherMismatch,
            DealerError::Unauthorized(_) => ErrorKind::Unauthorized,
            DealerError::InvalidAuthorityKey(_) => ErrorKind::InvalidAuthorityKey,
            DealerError::InvalidSessionKey(_) => ErrorKind::InvalidSessionKey,
            DealerError::MissingAccessToken => ErrorKind::MissingAccessToken,
            DealerError::Context { .. } => ErrorKind::Unknown,
        }
    }

    /// Check the root cause against a taxonomy member.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Validation fields of the root cause, if it is a validation error.
    pub fn validation_fields(&self) -> Option<&BTreeMap<String, String>> {
        match self.root() {
            DealerError::Invalid(validation) => Some(&validation.fields),
            _ => None,
        }
    }

    /// Rebuild an error from its wire representation.
    pub fn from_kind(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();

        match kind {
            ErrorKind::NotFound => Self::NotFound(detail),
            ErrorKind::Unknown => Self::Unknown(detail),
            ErrorKind::Invalid => Self::Invalid(ValidationError::default()),
            ErrorKind::UnknownType => Self::UnknownType(detail),
            ErrorKind::NotImplemented => Self::NotImplemented(detail),
            ErrorKind::UnknownStorageClaimType => Self::UnknownStorageClaimType(detail),
            ErrorKind::MissingStorageClaim => Self::MissingStorageClaim(detail),
            ErrorKind::StorageClaimAlreadyAllocated => Self::StorageClaimAlreadyAllocated(detail),
            ErrorKind::MissingRequest => Self::MissingRequest,
            ErrorKind::TimeoutReached => Self::TimeoutReached,
            ErrorKind::LockTimeout => Self::LockTimeout,
            ErrorKind::MissingLockAuthor => Self::MissingLockAuthor,
            ErrorKind::SegmentIsLocked => Self::SegmentIsLocked(detail),
            ErrorKind::MissingSegment => Self::MissingSegment,
            ErrorKind::MissingOrder => Self::MissingOrder,
            ErrorKind::MissingPublisher => Self::MissingPublisher,
            ErrorKind::MissingPerformer => Self::MissingPerformer,
            ErrorKind::MissingAuthor => Self::MissingAuthor,
            ErrorKind::PerformerMismatch => Self::PerformerMismatch(detail),
            ErrorKind::PublisherMismatch => Self::PublisherMismatch(detail),
            ErrorKind::Unauthorized => Self::Unauthorized(detail),
            ErrorKind::InvalidAuthorityKey => Self::InvalidAuthorityKey(detail),
            ErrorKind::InvalidSessionKey => Self::InvalidSessionKey(detail),
            ErrorKind::MissingAccessToken => Self::MissingAccessToken,
        }
    }

    /// LockTimeout is transient and should be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::LockTimeout | ErrorKind::TimeoutReached)
    }
}

impl From<serde_json::Error> for DealerError {
    fn from(err: serde_json::Error) -> Self {
        DealerError::Unknown(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for DealerError {
    fn from(err: std::io::Error) -> Self {
        DealerError::Unknown(format!("IO error: {}", err))
    }
}

/// Attach operation context to any error convertible into [`DealerError`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> DealerResult<T>;

    fn with_context<F, S>(self, f: F) -> DealerResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<DealerError>,
{
    fn context(self, context: impl Into<String>) -> DealerResult<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F, S>(self, f: F) -> DealerResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

/// Field-level validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field name → human readable message
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Record a failure for `field`. The first message per field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when no field failed.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid")?;

        if !self.fields.is_empty() {
            let joined = self
                .fields
                .iter()
                .map(|(field, message)| format!("{}: {}", field, message))
                .collect::<Vec<_>>()
                .join("; ");
            write!(f, " ({})", joined)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}
