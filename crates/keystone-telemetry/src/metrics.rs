//! Request metrics for Keystone.
//!
//! Metrics go through the `metrics` facade. Without an installed recorder
//! every call is a no-op.

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;
use std::time::Duration;

/// Counter of dispatched requests.
pub const REQUESTS_TOTAL: &str = "keystone_requests_total";

/// Histogram of request latency in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "keystone_request_duration_seconds";

/// Counter of `Internal` errors rendered by the dispatcher.
pub const INTERNAL_ERRORS_TOTAL: &str = "keystone_internal_errors_total";

static DESCRIBE: Once = Once::new();

fn describe() {
    DESCRIBE.call_once(|| {
        describe_counter!(REQUESTS_TOTAL, "Total number of dispatched requests");
        describe_histogram!(
            REQUEST_DURATION_SECONDS,
            ::metrics::Unit::Seconds,
            "Request dispatch duration in seconds"
        );
        describe_counter!(
            INTERNAL_ERRORS_TOTAL,
            "Internal errors rendered by the dispatcher"
        );
    });
}

/// Records a completed request.
///
/// * `stage` - the dispatch stage the request finished in
/// * `status_code` - HTTP status written
/// * `duration` - time spent dispatching
pub fn record_request(stage: &'static str, status_code: u16, duration: Duration) {
    describe();
    counter!(
        REQUESTS_TOTAL,
        "stage" => stage,
        "status" => status_code.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "stage" => stage).record(duration.as_secs_f64());
}

/// Records an internal error rendered at `stage`.
pub fn record_internal_error(stage: &'static str) {
    describe();
    counter!(INTERNAL_ERRORS_TOTAL, "stage" => stage).increment(1);
}
