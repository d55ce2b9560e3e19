use serde::Serialize;

use super::model::{DeadlineState, PlaylistRevision};

/// Read-only statistics for one tracked playlist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamMetrics {
    pub channel_id: String,
    pub playlist: String,
    pub playlist_uri: String,
    pub target_duration_secs: u64,
    pub deadline_state: DeadlineState,
    pub all_segments_received: bool,

    pub total_segments: usize,
    pub received_segments: usize,
    pub missing_segments: usize,
    pub timed_out_segments: usize,
    pub percent_received: f64,

    pub total_bytes: u64,
    pub average_segment_bytes: f64,
    pub elapsed_secs: f64,
    pub bitrate_bps: f64,

    pub transfer_delay: DelayStats,
    pub revisions_seen: usize,
    pub playlist_update_interval_ms: f64,
    pub jitter_ms: f64,

    pub timeout_events: u64,
    pub consecutive_timeouts: u64,
    pub max_consecutive_timeouts: u64,
    pub last_segment_received_at_ms: u64,
}

/// Advertise-to-arrival delay in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DelayStats {
    pub samples: usize,
    pub average_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl StreamMetrics {
    pub fn from_revision(revision: &PlaylistRevision) -> Self {
        let total_segments = revision.segments.len();
        let received: Vec<_> = revision.segments.iter().filter(|s| s.received).collect();
        let received_segments = received.len();

        let total_bytes: u64 = received.iter().filter_map(|s| s.size_bytes).sum();
        let average_segment_bytes = if received_segments > 0 {
            total_bytes as f64 / received_segments as f64
        } else {
            0.0
        };

        let earliest_advertised = received.iter().map(|s| s.first_advertised_at_ms).min();
        let latest_arrival = received.iter().filter_map(|s| s.received_at_ms).max();
        let elapsed_ms = match (earliest_advertised, latest_arrival) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        };
        let elapsed_secs = (elapsed_ms as f64 / 1000.0).max(1.0);

        let delays: Vec<u64> = received
            .iter()
            .filter_map(|s| {
                s.received_at_ms
                    .map(|at| at.saturating_sub(s.first_advertised_at_ms))
            })
            .collect();

        let percent_received = if total_segments > 0 {
            received_segments as f64 * 100.0 / total_segments as f64
        } else {
            0.0
        };

        let intervals: Vec<u64> = revision.arrival_intervals.iter().copied().collect();

        Self {
            channel_id: revision.key.channel_id.clone(),
            playlist: revision.key.playlist.clone(),
            playlist_uri: revision.playlist_uri.clone(),
            target_duration_secs: revision.target_duration_secs,
            deadline_state: revision.deadline_state,
            all_segments_received: revision.all_segments_received,
            total_segments,
            received_segments,
            missing_segments: total_segments - received_segments,
            timed_out_segments: revision.segments.iter().filter(|s| s.timed_out).count(),
            percent_received,
            total_bytes,
            average_segment_bytes,
            elapsed_secs,
            bitrate_bps: total_bytes as f64 * 8.0 / elapsed_secs,
            transfer_delay: delay_stats(&delays),
            revisions_seen: revision.revision_history.len(),
            playlist_update_interval_ms: update_interval(revision),
            jitter_ms: population_std_dev(&intervals),
            timeout_events: revision.timeout_event_count,
            consecutive_timeouts: revision.consecutive_timeout_streak,
            max_consecutive_timeouts: revision.max_consecutive_timeout_streak,
            last_segment_received_at_ms: revision.last_segment_received_at_ms,
        }
    }
}

fn delay_stats(delays: &[u64]) -> DelayStats {
    let (Some(&min_ms), Some(&max_ms)) = (delays.iter().min(), delays.iter().max()) else {
        return DelayStats::default();
    };
    DelayStats {
        samples: delays.len(),
        average_ms: delays.iter().sum::<u64>() as f64 / delays.len() as f64,
        min_ms,
        max_ms,
    }
}

/// Mean gap between consecutive revisions (history is newest first)
fn update_interval(revision: &PlaylistRevision) -> f64 {
    let history: Vec<u64> = revision.revision_history.iter().copied().collect();
    if history.len() < 2 {
        return 0.0;
    }
    let gaps: Vec<f64> = history
        .windows(2)
        .map(|pair| pair[0].saturating_sub(pair[1]) as f64)
        .collect();
    gaps.iter().sum::<f64>() / gaps.len() as f64
}

/// Population standard deviation; 0 below two samples
pub fn population_std_dev(samples: &[u64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
