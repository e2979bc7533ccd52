//! Process-wide counters.
//!
//! [`ProxyMetrics`] is created once at startup and handed to every component
//! that records something, as an `Arc`. The Prometheus text exposition is
//! rendered on demand by the metrics endpoint.
//!
//! Requests are counted per method and status code, with a latency histogram
//! for each pair.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Upper bounds (seconds) of the request latency histogram buckets.
pub const LATENCY_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Counters exposed on the metrics endpoint.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    requests: Mutex<BTreeMap<(String, u16), RequestStats>>,
    secondary_read_through_total: AtomicU64,
}

/// Count and latency distribution for one `(method, code)` pair.
#[derive(Debug, Default, Clone)]
struct RequestStats {
    count: u64,
    duration_sum: f64,
    buckets: [u64; LATENCY_BUCKETS.len()],
}

impl RequestStats {
    fn observe(&mut self, seconds: f64) {
        self.count += 1;
        self.duration_sum += seconds;
        for (bound, bucket) in LATENCY_BUCKETS.iter().zip(self.buckets.iter_mut()) {
            if seconds <= *bound {
                *bucket += 1;
            }
        }
    }
}

impl ProxyMetrics {
    /// Fresh counters, all zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one handled HTTP request with its final status and latency.
    pub fn record_request(&self, method: &str, status: u16, elapsed: Duration) {
        self.requests
            .lock()
            .entry((method.to_owned(), status))
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    /// Count one GET served by the secondary store after a primary miss.
    pub fn record_read_through(&self) {
        self.secondary_read_through_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests handled so far, across all methods and codes.
    #[must_use]
    pub fn requests_total(&self) -> u64 {
        self.requests.lock().values().map(|s| s.count).sum()
    }

    /// Requests handled so far with the given method and status code.
    #[must_use]
    pub fn requests_with(&self, method: &str, status: u16) -> u64 {
        self.requests
            .lock()
            .get(&(method.to_owned(), status))
            .map_or(0, |s| s.count)
    }

    /// Successful secondary-store read-throughs so far.
    #[must_use]
    pub fn secondary_read_through_total(&self) -> u64 {
        self.secondary_read_through_total.load(Ordering::Relaxed)
    }

    /// Render all counters in the Prometheus text exposition format.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let requests = self.requests.lock().clone();
        let mut out = String::new();

        // Writing to a String cannot fail.
        let _ = writeln!(out, "# HELP s3proxy_requests_total Total number of HTTP requests handled.");
        let _ = writeln!(out, "# TYPE s3proxy_requests_total counter");
        for ((method, code), stats) in &requests {
            let _ = writeln!(
                out,
                "s3proxy_requests_total{{method=\"{method}\",code=\"{code}\"}} {}",
                stats.count
            );
        }

        let _ = writeln!(
            out,
            "# HELP s3proxy_request_duration_seconds HTTP request latencies in seconds."
        );
        let _ = writeln!(out, "# TYPE s3proxy_request_duration_seconds histogram");
        for ((method, code), stats) in &requests {
            let labels = format!("method=\"{method}\",code=\"{code}\"");
            for (bound, bucket) in LATENCY_BUCKETS.iter().zip(stats.buckets.iter()) {
                let _ = writeln!(
                    out,
                    "s3proxy_request_duration_seconds_bucket{{{labels},le=\"{bound}\"}} {bucket}"
                );
            }
            let _ = writeln!(
                out,
                "s3proxy_request_duration_seconds_bucket{{{labels},le=\"+Inf\"}} {}",
                stats.count
            );
            let _ = writeln!(
                out,
                "s3proxy_request_duration_seconds_sum{{{labels}}} {}",
                stats.duration_sum
            );
            let _ = writeln!(
                out,
                "s3proxy_request_duration_seconds_count{{{labels}}} {}",
                stats.count
            );
        }

        let _ = writeln!(
            out,
            "# HELP secondary_store_read_through_total The total requests that read through to the secondary store."
        );
        let _ = writeln!(out, "# TYPE secondary_store_read_through_total counter");
        let _ = writeln!(
            out,
            "secondary_store_read_through_total {}",
            self.secondary_read_through_total()
        );
        out
    }
}
