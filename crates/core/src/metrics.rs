//! Prometheus metrics for the quote pipeline.
//!
//! A single [`QuoteMetrics`] is created at application start and shared
//! (`Arc`) with the poller, the price source, the storage engines and the
//! read API. The recorder behind it is never installed globally: every
//! series is registered against this instance, and `/metrics` renders it.

use std::time::Instant;

use ::metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Counter,
    Gauge, Histogram, Unit,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const POLL_CYCLES: &str = "stonks_poll_cycles_total";
pub const FETCH_FAILURES: &str = "stonks_fetch_failures_total";
pub const STORE_FAILURES: &str = "stonks_store_failures_total";
pub const QUOTES_APPENDED: &str = "stonks_quotes_appended_total";
pub const QUOTES_REJECTED: &str = "stonks_quotes_rejected_total";
pub const READS: &str = "stonks_reads_total";

pub const CLIENT_REQUESTS: &str = "stonks_client_api_requests_total";
pub const CLIENT_IN_FLIGHT: &str = "stonks_client_in_flight_requests";
pub const CLIENT_REQUEST_DURATION: &str = "stonks_client_request_duration_seconds";

pub const SERVER_REQUESTS: &str = "stonks_api_requests_total";
pub const SERVER_IN_FLIGHT: &str = "stonks_server_in_flight_requests";
pub const SERVER_REQUEST_DURATION: &str = "stonks_request_duration_seconds";
pub const SERVER_RESPONSE_BYTES: &str = "stonks_response_size_bytes";

/// Prometheus default latency buckets.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const SIZE_BUCKETS: &[f64] = &[64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0];

/// Metrics context for ingestion, reads and HTTP traffic.
pub struct QuoteMetrics {
    handle: PrometheusHandle,
    poll_cycles: Counter,
    fetch_failures: Counter,
    store_failures: Counter,
    quotes_appended: Counter,
    quotes_rejected: Counter,
    reads: Counter,
    client: RequestSeries,
    server: RequestSeries,
    response_bytes: Histogram,
}

/// Pipeline counters read back from the exporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub poll_cycles: u64,
    pub fetch_failures: u64,
    pub store_failures: u64,
    pub quotes_appended: u64,
    pub quotes_rejected: u64,
    pub reads: u64,
    pub client_requests: u64,
    pub server_requests: u64,
}

#[derive(Clone)]
struct RequestSeries {
    total: Counter,
    in_flight: Gauge,
    duration: Histogram,
}

/// Marks one request as in flight until dropped.
///
/// Dropping the guard counts the request and records its duration, so a
/// request abandoned by cancellation is still accounted for.
pub struct InFlightRequest {
    series: RequestSeries,
    started: Instant,
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        self.series.in_flight.decrement(1.0);
        self.series.total.increment(1);
        self.series.duration.record(self.started.elapsed().as_secs_f64());
    }
}

impl QuoteMetrics {
    pub fn new() -> Self {
        let builder = PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS)
            .and_then(|b| {
                b.set_buckets_for_metric(
                    Matcher::Full(SERVER_RESPONSE_BYTES.to_string()),
                    SIZE_BUCKETS,
                )
            })
            .unwrap_or_else(|e| {
                log::warn!("Histogram buckets rejected, falling back to summaries: {}", e);
                PrometheusBuilder::new()
            });
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            Self {
                handle,
                poll_cycles: counter!(POLL_CYCLES),
                fetch_failures: counter!(FETCH_FAILURES),
                store_failures: counter!(STORE_FAILURES),
                quotes_appended: counter!(QUOTES_APPENDED),
                quotes_rejected: counter!(QUOTES_REJECTED),
                reads: counter!(READS),
                client: RequestSeries {
                    total: counter!(CLIENT_REQUESTS),
                    in_flight: gauge!(CLIENT_IN_FLIGHT),
                    duration: histogram!(CLIENT_REQUEST_DURATION),
                },
                server: RequestSeries {
                    total: counter!(SERVER_REQUESTS),
                    in_flight: gauge!(SERVER_IN_FLIGHT),
                    duration: histogram!(SERVER_REQUEST_DURATION),
                },
                response_bytes: histogram!(SERVER_RESPONSE_BYTES),
            }
        })
    }

    pub fn record_poll_cycle(&self) {
        self.poll_cycles.increment(1);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.increment(1);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.increment(1);
    }

    pub fn record_appended(&self, count: usize) {
        self.quotes_appended.increment(count as u64);
    }

    pub fn record_rejected(&self, count: usize) {
        self.quotes_rejected.increment(count as u64);
    }

    pub fn record_read(&self) {
        self.reads.increment(1);
    }

    /// Tracks one outbound call to the price source.
    pub fn track_client_request(&self) -> InFlightRequest {
        Self::track(&self.client)
    }

    /// Tracks one request served by the read API.
    pub fn track_server_request(&self) -> InFlightRequest {
        Self::track(&self.server)
    }

    pub fn record_response_bytes(&self, bytes: u64) {
        self.response_bytes.record(bytes as f64);
    }

    fn track(series: &RequestSeries) -> InFlightRequest {
        series.in_flight.increment(1.0);
        InFlightRequest {
            series: series.clone(),
            started: Instant::now(),
        }
    }

    /// Renders every series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.run_upkeep();
        self.handle.render()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let rendered = self.render();
        let read = |name: &str| sample_value(&rendered, name).map_or(0, |v| v as u64);
        MetricsSnapshot {
            poll_cycles: read(POLL_CYCLES),
            fetch_failures: read(FETCH_FAILURES),
            store_failures: read(STORE_FAILURES),
            quotes_appended: read(QUOTES_APPENDED),
            quotes_rejected: read(QUOTES_REJECTED),
            reads: read(READS),
            client_requests: read(CLIENT_REQUESTS),
            server_requests: read(SERVER_REQUESTS),
        }
    }
}

impl Default for QuoteMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuoteMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteMetrics").finish_non_exhaustive()
    }
}

fn describe_metrics() {
    describe_counter!(POLL_CYCLES, "Polling cycles started");
    describe_counter!(FETCH_FAILURES, "Fetches that failed or timed out");
    describe_counter!(STORE_FAILURES, "Appends that failed");
    describe_counter!(QUOTES_APPENDED, "Quotes written to the store");
    describe_counter!(QUOTES_REJECTED, "Quotes rejected for untracked symbols");
    describe_counter!(READS, "Single and batch reads served by the store");

    describe_counter!(CLIENT_REQUESTS, "Requests made to the price source");
    describe_gauge!(CLIENT_IN_FLIGHT, "Requests to the price source in flight");
    describe_histogram!(
        CLIENT_REQUEST_DURATION,
        Unit::Seconds,
        "Latency of requests to the price source"
    );

    describe_counter!(SERVER_REQUESTS, "Requests handled by the read API");
    describe_gauge!(SERVER_IN_FLIGHT, "Requests currently being served");
    describe_histogram!(
        SERVER_REQUEST_DURATION,
        Unit::Seconds,
        "Latency of read API requests"
    );
    describe_histogram!(
        SERVER_RESPONSE_BYTES,
        Unit::Bytes,
        "Size of read API response bodies"
    );
}

/// Value of an unlabelled series in rendered exposition text.
fn sample_value(rendered: &str, name: &str) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            if series == name {
                value.parse().ok()
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_REQUEST_DURATION_COUNT: &str = "stonks_client_request_duration_seconds_count";

    #[test]
    fn test_snapshot_reflects_recorded_counts() {
        let metrics = QuoteMetrics::new();
        metrics.record_poll_cycle();
        metrics.record_poll_cycle();
        metrics.record_appended(5);
        metrics.record_rejected(1);
        metrics.record_read();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.poll_cycles, 2);
        assert_eq!(snapshot.quotes_appended, 5);
        assert_eq!(snapshot.quotes_rejected, 1);
        assert_eq!(snapshot.reads, 1);
        assert_eq!(snapshot.fetch_failures, 0);
    }

    #[test]
    fn test_instances_do_not_share_series() {
        let first = QuoteMetrics::new();
        let second = QuoteMetrics::new();
        first.record_poll_cycle();

        assert_eq!(first.snapshot().poll_cycles, 1);
        assert_eq!(second.snapshot().poll_cycles, 0);
    }

    #[test]
    fn test_request_guard_counts_on_drop() {
        let metrics = QuoteMetrics::new();
        {
            let _request = metrics.track_client_request();
            let rendered = metrics.render();
            assert_eq!(sample_value(&rendered, CLIENT_IN_FLIGHT), Some(1.0));
            assert_eq!(metrics.snapshot().client_requests, 0);
        }

        let rendered = metrics.render();
        assert_eq!(sample_value(&rendered, CLIENT_IN_FLIGHT), Some(0.0));
        assert_eq!(sample_value(&rendered, CLIENT_REQUEST_DURATION_COUNT), Some(1.0));
        assert_eq!(metrics.snapshot().client_requests, 1);
    }

    #[test]
    fn test_render_uses_exposition_format() {
        let metrics = QuoteMetrics::new();
        metrics.record_read();
        let _request = metrics.track_server_request();
        metrics.record_response_bytes(512);

        let rendered = metrics.render();
        assert!(rendered.contains("# TYPE stonks_reads_total counter"));
        assert!(rendered.contains("# TYPE stonks_server_in_flight_requests gauge"));
        assert!(rendered.contains("# TYPE stonks_response_size_bytes histogram"));
        assert_eq!(sample_value(&rendered, "stonks_response_size_bytes_count"), Some(1.0));
    }

    #[test]
    fn test_sample_value_skips_comments_and_prefixes() {
        let rendered = "# HELP stonks_reads_total Reads\n\
                        stonks_reads_total_extra 9\n\
                        stonks_reads_total 4\n";
        assert_eq!(sample_value(rendered, READS), Some(4.0));
        assert_eq!(sample_value(rendered, POLL_CYCLES), None);
    }
}
