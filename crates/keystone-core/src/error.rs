//! Error taxonomy for Keystone.
//!
//! Every failure in the request pipeline is expressed as an [`AppError`]: a
//! value drawn from the closed [`ErrorKind`] set, an optional offending field
//! name and a human-readable message. Only the dispatcher turns an
//! `AppError` into a response; lower layers return it.
//!
//! | `ErrorKind`        | HTTP status |
//! |--------------------|-------------|
//! | `InvalidArgument`  | 400         |
//! | `Unauthenticated`  | 401         |
//! | `PermissionDenied` | 403         |
//! | `NotFound`         | 404         |
//! | `AlreadyExists`    | 409         |
//! | `Internal`         | 500         |
//!
//! Errors produced outside the taxonomy (I/O, storage, serialization) are
//! normalized with [`convert`], which wraps them as `Internal` while keeping
//! the original error as the cause.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using [`AppError`].
pub type AppResult<T> = Result<T, AppError>;

/// The closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller supplied an invalid value.
    InvalidArgument,
    /// No (valid) identity was presented.
    Unauthenticated,
    /// The identity is known but not allowed to perform the call.
    PermissionDenied,
    /// The addressed resource does not exist.
    NotFound,
    /// The resource would violate a uniqueness constraint.
    AlreadyExists,
    /// Anything the caller cannot act upon.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the snake_case name used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a value was rejected by validation.
///
/// Every reason belongs to the `InvalidArgument` kind. The reason is kept
/// separately from the message so tests and clients can match on it without
/// parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Missing or empty value for a `required` field.
    Required,
    /// Explicitly supplied empty value for a `noempty` field.
    Empty,
    /// Value longer than `max_len`.
    TooLong,
    /// Not a UUID.
    InvalidUuid,
    /// Not a slug.
    InvalidSlug,
    /// Neither a slug nor a UUID.
    InvalidSlugOrUuid,
    /// Not an email address.
    InvalidEmail,
    /// Not an absolute URL.
    InvalidUrl,
    /// Not one of the allowed values.
    NotAllowed,
    /// Integer outside `min`/`max`.
    OutOfRange,
    /// Could not be parsed as an integer.
    InvalidInteger,
    /// Could not be parsed as a boolean.
    InvalidBoolean,
    /// File content is not a decodable image.
    InvalidImage,
    /// Fewer items than `min_items`.
    TooFewItems,
    /// More items than `max_items`.
    TooManyItems,
    /// An array contained an empty item under `no_empty_items`.
    EmptyItem,
    /// Rejected by a credential check.
    InvalidCredentials,
    /// Rejected by a struct-level self validation.
    Invalid,
}

impl Reason {
    /// Returns the default message for a field rejected for this reason.
    #[must_use]
    pub fn describe(&self, field: &str) -> String {
        match self {
            Self::Required => format!("{field} is required"),
            Self::Empty => format!("{field} cannot be empty"),
            Self::TooLong => format!("{field} is too long"),
            Self::InvalidUuid => format!("{field} must be a valid uuid"),
            Self::InvalidSlug => format!("{field} must be a valid slug"),
            Self::InvalidSlugOrUuid => format!("{field} must be a valid slug or uuid"),
            Self::InvalidEmail => format!("{field} must be a valid email address"),
            Self::InvalidUrl => format!("{field} must be a valid url"),
            Self::NotAllowed => format!("{field} is not an allowed value"),
            Self::OutOfRange => format!("{field} is out of range"),
            Self::InvalidInteger => format!("{field} must be an integer"),
            Self::InvalidBoolean => format!("{field} must be a boolean"),
            Self::InvalidImage => format!("{field} must be a valid image"),
            Self::TooFewItems => format!("{field} has too few items"),
            Self::TooManyItems => format!("{field} has too many items"),
            Self::EmptyItem => format!("{field} cannot contain empty items"),
            Self::InvalidCredentials => format!("{field} is invalid"),
            Self::Invalid => format!("{field} is invalid"),
        }
    }
}

/// The error value used throughout the request pipeline.
///
/// `AppError` is created once and never mutated; the `with_*` methods
/// consume the error and return a new one, so they are only useful while the
/// error is being built.
///
/// # Example
///
/// ```
/// use keystone_core::{AppError, ErrorKind, Reason};
///
/// let err = AppError::validation("email", Reason::InvalidEmail);
/// assert_eq!(err.kind(), ErrorKind::InvalidArgument);
/// assert_eq!(err.field(), Some("email"));
/// assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
/// ```
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    field: Option<String>,
    message: String,
    reason: Option<Reason>,
    #[source]
    cause: Option<anyhow::Error>,
}

impl AppError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
            reason: None,
            cause: None,
        }
    }

    /// Creates a field-attributed `InvalidArgument` error with a custom message.
    #[must_use]
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message).with_field(field)
    }

    /// Creates a field-attributed validation error with the default message
    /// for `reason`.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: Reason) -> Self {
        let field = field.into();
        Self {
            kind: ErrorKind::InvalidArgument,
            message: reason.describe(&field),
            field: Some(field),
            reason: Some(reason),
            cause: None,
        }
    }

    /// Creates an `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    /// Creates a `PermissionDenied` error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates an `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Creates an `Internal` error that keeps `cause` for logs and reports.
    pub fn internal_with_cause(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Internal, message).with_cause(cause)
    }

    /// Attaches the offending field name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attaches a validation reason.
    #[must_use]
    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Attaches the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the offending field, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the validation reason, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<Reason> {
        self.reason
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    /// Returns `true` for `Internal` errors.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self.kind, ErrorKind::Internal)
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    /// Builds the client-facing envelope.
    ///
    /// `Internal` errors never expose their message, field or cause: the
    /// envelope carries `internal_message` instead.
    #[must_use]
    pub fn to_envelope(&self, internal_message: &str) -> ErrorEnvelope {
        if self.is_internal() {
            return ErrorEnvelope {
                error: internal_message.to_string(),
                field: None,
            };
        }
        ErrorEnvelope {
            error: self.message.clone(),
            field: self.field.clone(),
        }
    }

    /// Renders the message followed by the cause chain, for logs.
    #[must_use]
    pub fn detailed(&self) -> String {
        match &self.cause {
            Some(cause) => format!("{}: {cause:#}", self.message),
            None => self.message.clone(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        convert(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        convert(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        convert(err)
    }
}

/// Normalizes any error into the taxonomy.
///
/// An `AppError` (possibly wrapped in an `anyhow::Error`) is returned
/// unchanged; anything else becomes `Internal` with the original kept as the
/// cause.
///
/// # Example
///
/// ```
/// use keystone_core::{convert, AppError, ErrorKind};
///
/// let io = std::io::Error::other("disk on fire");
/// let err = convert(io);
/// assert_eq!(err.kind(), ErrorKind::Internal);
/// assert!(err.cause().is_some());
///
/// let nf = convert(anyhow::Error::new(AppError::not_found("no such user")));
/// assert_eq!(nf.kind(), ErrorKind::NotFound);
/// ```
pub fn convert(err: impl Into<anyhow::Error>) -> AppError {
    match err.into().downcast::<AppError>() {
        Ok(app) => app,
        Err(other) => AppError {
            kind: ErrorKind::Internal,
            field: None,
            message: other.to_string(),
            reason: None,
            cause: Some(other),
        },
    }
}

/// Serializable error body: `{"error": "...", "field": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable message.
    pub error: String,
    /// Offending input, omitted when not applicable.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub field: Option<String>,
}
