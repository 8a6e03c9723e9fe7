//! Error reporting boundary.
//!
//! A [`Reporter`] ships `Internal` errors to an external error tracker. The
//! dispatcher hands each request a [`ReportScope`] that accumulates the user
//! and tags for that request and attaches them to every report it sends.

use crate::error::AppError;
use crate::request_id::RequestId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Request the error happened in.
    pub request_id: RequestId,
    /// Top-level message.
    pub message: String,
    /// Message plus cause chain.
    pub detail: String,
    /// User the request was made by, if known.
    pub user_id: Option<String>,
    /// Free-form tags.
    pub tags: BTreeMap<String, String>,
}

/// Sink for error reports.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Delivers a report. Failures are the reporter's own concern.
    async fn report(&self, report: ErrorReport);
}

/// A [`Reporter`] that writes reports to the `tracing` error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn report(&self, report: ErrorReport) {
        tracing::error!(
            request_id = %report.request_id,
            user_id = report.user_id.as_deref().unwrap_or("anonymous"),
            tags = ?report.tags,
            detail = %report.detail,
            "{}",
            report.message
        );
    }
}

/// Per-request reporting handle.
///
/// # Example
///
/// ```
/// use keystone_core::{ReportScope, RequestId, TracingReporter};
/// use std::sync::Arc;
///
/// let mut scope = ReportScope::new(Arc::new(TracingReporter), RequestId::new());
/// scope.set_user("u1");
/// scope.add_tag("endpoint", "users.show");
/// assert_eq!(scope.user(), Some("u1"));
/// ```
#[derive(Clone)]
pub struct ReportScope {
    reporter: Arc<dyn Reporter>,
    request_id: RequestId,
    user_id: Option<String>,
    tags: BTreeMap<String, String>,
}

impl ReportScope {
    /// Creates a scope for one request.
    #[must_use]
    pub fn new(reporter: Arc<dyn Reporter>, request_id: RequestId) -> Self {
        Self {
            reporter,
            request_id,
            user_id: None,
            tags: BTreeMap::new(),
        }
    }

    /// Sets the user attached to subsequent reports.
    pub fn set_user(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    /// Returns the current user.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Adds or replaces a tag.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Adds or replaces several tags.
    pub fn add_tags<K, V>(&mut self, tags: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in tags {
            self.add_tag(key, value);
        }
    }

    /// Returns the current tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    fn build(&self, err: &AppError) -> ErrorReport {
        ErrorReport {
            request_id: self.request_id,
            message: err.message().to_string(),
            detail: err.detailed(),
            user_id: self.user_id.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Reports in the background and returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn report_error(&self, err: &AppError) {
        let report = self.build(err);
        let reporter = Arc::clone(&self.reporter);
        tokio::spawn(async move {
            reporter.report(report).await;
        });
    }

    /// Reports and waits for the reporter to finish.
    pub async fn report_error_and_wait(&self, err: &AppError) {
        self.reporter.report(self.build(err)).await;
    }
}

impl std::fmt::Debug for ReportScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportScope")
            .field("request_id", &self.request_id)
            .field("user_id", &self.user_id)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
