//! Dispatcher configuration.

use http::HeaderName;
use serde::{Deserialize, Serialize};

/// Default credential realm.
pub const DEFAULT_REALM: &str = "keystone";

/// Default message shown to callers for `Internal` errors.
pub const DEFAULT_INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Default maximum request body size (10 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default response header carrying the request ID.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Settings read by the [`Dispatcher`](crate::Dispatcher).
///
/// Created once at startup and never changed afterwards.
///
/// # Example
///
/// ```
/// use keystone_dispatch::DispatcherConfig;
///
/// let config = DispatcherConfig::default();
/// assert_eq!(config.realm, "keystone");
/// assert_eq!(config.request_id_header_name().as_str(), "x-request-id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Realm accepted in `Authorization` header values.
    pub realm: String,

    /// Message rendered in place of the real message of `Internal` errors.
    pub internal_error_message: String,

    /// Whether `Internal` errors are sent to the reporter.
    pub report_internal_errors: bool,

    /// Maximum accepted request body size in bytes.
    pub max_body_size: usize,

    /// Response header carrying the request ID.
    pub request_id_header: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            internal_error_message: DEFAULT_INTERNAL_ERROR_MESSAGE.to_string(),
            report_internal_errors: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            request_id_header: DEFAULT_REQUEST_ID_HEADER.to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Returns the request ID header, falling back to `x-request-id` when the
    /// configured name is not a valid header name.
    #[must_use]
    pub fn request_id_header_name(&self) -> HeaderName {
        HeaderName::from_bytes(self.request_id_header.trim().as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER))
    }
}
