//! Metrics sink.
//!
//! The gateway records plain named counters and timings through the
//! `metrics` facade; whatever recorder the binary installs (the server
//! installs the Prometheus exporter) receives them. With no recorder
//! installed, every call is a no-op, which keeps the core usable from
//! tests without ceremony.
//!
//! Names in use: the RPC method names themselves, `bad_request`,
//! `hit_cache`, `hit_cache_<method>`, `miss_cache`.

use metrics::{counter, histogram};

/// Increments the named counter by one.
pub fn count(name: &str) {
    counter!(name.to_string()).increment(1);
}

/// Records a request duration in milliseconds under the given name.
pub fn time(name: &str, ms: f64) {
    histogram!(format!("{name}_duration_ms")).record(ms);
}
