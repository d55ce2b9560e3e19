//! Prometheus instrumentation.
//!
//! Helpers are no-ops until [`install`] registers the global recorder, so
//! unit tests can call into instrumented code without any setup.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once per process.
///
/// Returns `None` if another recorder was already installed.
pub fn install() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder unavailable: {}", e);
                None
            }
        })
        .clone()
}

/// Count a handled request by route kind and status
pub fn record_request(kind: &'static str, status: u16) {
    counter!("ingest_requests_total", "kind" => kind, "status" => status.to_string()).increment(1);
}

/// Record handler latency since `start`
pub fn record_duration(kind: &'static str, start: Instant) {
    histogram!("ingest_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_playlist() {
    counter!("ingest_playlists_total").increment(1);
}

pub fn record_not_a_playlist() {
    counter!("ingest_playlists_skipped_total").increment(1);
}

/// Count a segment upload by correlation outcome
pub fn record_segment(outcome: &'static str) {
    counter!("ingest_segments_total", "outcome" => outcome).increment(1);
}

pub fn record_timeouts(count: u64) {
    counter!("ingest_segment_timeouts_total").increment(count);
}

pub fn record_storage_error() {
    counter!("ingest_storage_errors_total").increment(1);
}
