use crate::{server::state::AppState, tracking::stats::StreamMetrics};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub streams: Vec<StreamMetrics>,
    pub unmatched_segments: BTreeMap<String, u64>,
}

/// JSON snapshot of every tracked playlist
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        streams: state.engine.snapshot_metrics(),
        unmatched_segments: state.engine.unmatched_counts(),
    })
}

/// Plain-text rendering of the same snapshot
pub async fn report(State(state): State<AppState>) -> Response {
    let body = render_report(
        &state.engine.snapshot_metrics(),
        &state.engine.unmatched_counts(),
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Prometheus exposition of the operational counters
pub async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed\n").into_response(),
    }
}

pub fn render_report(streams: &[StreamMetrics], unmatched: &BTreeMap<String, u64>) -> String {
    let mut out = String::with_capacity(512 + streams.len() * 512);

    let _ = writeln!(out, "HLS ingest report");
    let _ = writeln!(out, "=================");

    if streams.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "No playlists tracked yet.");
    }

    for m in streams {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}] {} ({})", m.channel_id, m.playlist, m.playlist_uri);
        let _ = writeln!(
            out,
            "  state: {}  target duration: {}s",
            m.deadline_state.as_str(),
            m.target_duration_secs
        );
        let _ = writeln!(
            out,
            "  segments: {}/{} received ({:.1}%), {} missing, {} timed out",
            m.received_segments,
            m.total_segments,
            m.percent_received,
            m.missing_segments,
            m.timed_out_segments
        );
        let _ = writeln!(
            out,
            "  bytes: {} total, {:.0} avg/segment, {:.0} bps over {:.1}s",
            m.total_bytes, m.average_segment_bytes, m.bitrate_bps, m.elapsed_secs
        );
        let _ = writeln!(
            out,
            "  transfer delay: avg {:.0}ms, min {}ms, max {}ms ({} samples)",
            m.transfer_delay.average_ms,
            m.transfer_delay.min_ms,
            m.transfer_delay.max_ms,
            m.transfer_delay.samples
        );
        let _ = writeln!(
            out,
            "  playlist updates: {} revisions, avg interval {:.0}ms",
            m.revisions_seen, m.playlist_update_interval_ms
        );
        let _ = writeln!(out, "  arrival jitter: {:.1}ms", m.jitter_ms);
        let _ = writeln!(
            out,
            "  timeouts: {} events, streak {}, max streak {}",
            m.timeout_events, m.consecutive_timeouts, m.max_consecutive_timeouts
        );
    }

    if !unmatched.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Unmatched uploads:");
        for (channel, count) in unmatched {
            let _ = writeln!(out, "  {}: {}", channel, count);
        }
    }

    out
}
