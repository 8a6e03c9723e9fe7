//! Structured logging and request metrics for Keystone.
//!
//! - **Logging**: `tracing-subscriber` output in JSON or pretty format,
//!   filtered through an `EnvFilter` directive
//! - **Metrics**: request counters and latency histograms through the
//!   `metrics` facade; installing an exporter is left to the application
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `keystone_requests_total` | Counter | `stage`, `status` | Total request count |
//! | `keystone_request_duration_seconds` | Histogram | `stage` | Request latency |
//! | `keystone_internal_errors_total` | Counter | `stage` | Internal errors seen by the dispatcher |
//!
//! The `stage` label is the dispatch stage a request finished in.
//!
//! # Example
//!
//! ```rust,ignore
//! use keystone_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(request_id = "0190...", "dispatching");
//! ```

#![doc(html_root_url = "https://docs.rs/keystone-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use self::error::TelemetryError;
pub use self::logging::{create_env_filter, init_logging, LogConfig, LogFormat};
pub use self::metrics::{record_internal_error, record_request};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
