//! Per-request context handed to handlers.
//!
//! A [`RequestContext`] is created by the dispatcher once identity is
//! resolved, the guard has passed and parameters are bound. It is dropped
//! when the handler returns.

use crate::credentials::Credentials;
use crate::guard::BoundParams;
use crate::response::ResponseSink;
use http::{Method, Uri};
use keystone_bind::RequestBuckets;
use keystone_core::{AppError, AppResult, Identity, ReportScope, RequestId, User};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::Span;

/// Everything a handler knows about its request.
///
/// # Example
///
/// ```ignore
/// async fn show_invoice(ctx: RequestContext) -> AppResult<()> {
///     let params = ctx.params::<ShowInvoice>()?;
///     ctx.record_field("invoice_id", &params.id);
///     let invoice = load(&params.id).await?;
///     ctx.response().ok(&invoice)
/// }
/// ```
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    identity: Arc<Identity>,
    credentials: Option<Credentials>,
    buckets: RequestBuckets,
    params: Option<BoundParams>,
    span: Span,
    report: Arc<Mutex<ReportScope>>,
    response: ResponseSink,
}

/// Pieces the dispatcher assembles into a [`RequestContext`].
pub(crate) struct ContextParts {
    pub request_id: RequestId,
    pub method: Method,
    pub uri: Uri,
    pub identity: Arc<Identity>,
    pub credentials: Option<Credentials>,
    pub buckets: RequestBuckets,
    pub params: Option<BoundParams>,
    pub span: Span,
    pub report: Arc<Mutex<ReportScope>>,
    pub response: ResponseSink,
}

impl RequestContext {
    pub(crate) fn new(parts: ContextParts) -> Self {
        Self {
            request_id: parts.request_id,
            method: parts.method,
            uri: parts.uri,
            identity: parts.identity,
            credentials: parts.credentials,
            buckets: parts.buckets,
            params: parts.params,
            span: parts.span,
            report: parts.report,
            response: parts.response,
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the authenticated user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.identity.user.as_ref()
    }

    /// Returns the credentials the request carried.
    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the raw source buckets.
    #[must_use]
    pub const fn buckets(&self) -> &RequestBuckets {
        &self.buckets
    }

    /// Returns the bound parameters.
    ///
    /// # Errors
    ///
    /// `Internal` when the endpoint declared no parameters or declared a
    /// different type.
    pub fn params<T: 'static>(&self) -> AppResult<&T> {
        let params = self.params.as_ref().ok_or_else(|| {
            AppError::internal("endpoint declares no parameters")
        })?;
        params.downcast_ref::<T>().ok_or_else(|| {
            AppError::internal(format!(
                "endpoint parameters are not of type {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Returns the request span. Events logged inside it carry the request
    /// ID and user ID.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Attaches a key/value pair to this request's logs and error reports.
    pub fn record_field(&self, key: &str, value: &str) {
        tracing::debug!(parent: &self.span, key, value, "request field");
        self.report.lock().add_tag(key, value);
    }

    /// Logs an error inside the request span.
    pub fn log_error(&self, err: &AppError) {
        tracing::error!(
            parent: &self.span,
            kind = %err.kind(),
            field = err.field(),
            error = %err.detailed(),
            "handler error"
        );
    }

    /// Sets the user attached to error reports.
    pub fn set_report_user(&self, user_id: &str) {
        self.report.lock().set_user(user_id);
    }

    /// Adds a tag to error reports.
    pub fn add_report_tag(&self, key: &str, value: &str) {
        self.report.lock().add_tag(key, value);
    }

    /// Adds several tags to error reports.
    pub fn add_report_tags<'a>(&self, tags: impl IntoIterator<Item = (&'a str, &'a str)>) {
        self.report.lock().add_tags(tags);
    }

    /// Reports an error in the background.
    pub fn report_error(&self, err: &AppError) {
        self.report.lock().report_error(err);
    }

    /// Reports an error and waits for the reporter.
    pub async fn report_error_and_wait(&self, err: &AppError) {
        let scope = self.report.lock().clone();
        scope.report_error_and_wait(err).await;
    }

    /// Returns the response sink.
    #[must_use]
    pub const fn response(&self) -> &ResponseSink {
        &self.response
    }
}
