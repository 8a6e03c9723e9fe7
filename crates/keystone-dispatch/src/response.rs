//! Response rendering.
//!
//! Every response written by the dispatcher is JSON, carries
//! `cache-control: no-store` and, once it leaves the dispatcher, the
//! request ID header.
//!
//! Error bodies use the envelope `{"error": "...", "field": "..."}`, with
//! `field` omitted when the error is not about one input. `Internal` errors
//! never show their own message or field.

use crate::config::DispatcherConfig;
use crate::types::{json_response, Response};
use bytes::Bytes;
use http::StatusCode;
use keystone_core::{AppError, AppResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Renders a success response, serializing `body` when given.
///
/// # Errors
///
/// `Internal` if the body fails to serialize.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use keystone_dispatch::render_success;
///
/// let response = render_success(StatusCode::CREATED, Some(&serde_json::json!({"id": 7}))).unwrap();
/// assert_eq!(response.status(), StatusCode::CREATED);
/// ```
pub fn render_success<B>(status: StatusCode, body: Option<&B>) -> AppResult<Response>
where
    B: Serialize + ?Sized,
{
    let bytes = match body {
        Some(body) => Bytes::from(
            serde_json::to_vec(body)
                .map_err(|e| AppError::internal_with_cause("failed to encode response body", e))?,
        ),
        None => Bytes::new(),
    };
    Ok(json_response(status, bytes))
}

/// Renders an error response.
///
/// # Example
///
/// ```
/// use keystone_core::{AppError, Reason};
/// use keystone_dispatch::{render_error, DispatcherConfig};
///
/// let response = render_error(&AppError::validation("email", Reason::Required), &DispatcherConfig::default());
/// assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
/// ```
#[must_use]
pub fn render_error(err: &AppError, config: &DispatcherConfig) -> Response {
    let envelope = err.to_envelope(&config.internal_error_message);
    let body = serde_json::to_vec(&envelope).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to encode error envelope");
        br#"{"error":"internal server error"}"#.to_vec()
    });
    json_response(err.status_code(), Bytes::from(body))
}

/// Where a handler writes its response.
///
/// Cloning shares the slot; the dispatcher keeps one clone and reads the
/// response back once the handler returns. At most one response can be
/// written.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    slot: Arc<Mutex<Option<Response>>>,
}

impl ResponseSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders `body` with `200 OK`.
    pub fn ok<B: Serialize + ?Sized>(&self, body: &B) -> AppResult<()> {
        self.render(StatusCode::OK, Some(body))
    }

    /// Renders `body` with `201 Created`.
    pub fn created<B: Serialize + ?Sized>(&self, body: &B) -> AppResult<()> {
        self.render(StatusCode::CREATED, Some(body))
    }

    /// Renders an empty `204 No Content`.
    pub fn no_content(&self) -> AppResult<()> {
        self.render::<()>(StatusCode::NO_CONTENT, None)
    }

    /// Renders a success response with any status.
    ///
    /// # Errors
    ///
    /// `Internal` if a response was already written or the body fails to
    /// serialize.
    pub fn render<B: Serialize + ?Sized>(&self, status: StatusCode, body: Option<&B>) -> AppResult<()> {
        let response = render_success(status, body)?;
        self.write(response)
    }

    /// Stores a prebuilt response.
    ///
    /// # Errors
    ///
    /// `Internal` if a response was already written.
    pub fn write(&self, response: Response) -> AppResult<()> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(AppError::internal("response already written"));
        }
        *slot = Some(response);
        Ok(())
    }

    /// Returns `true` once a response has been written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Takes the written response, leaving the sink empty.
    pub fn take(&self) -> Option<Response> {
        self.slot.lock().take()
    }
}
