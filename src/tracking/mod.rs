//! Stream-session correlation and timeout detection.
//!
//! [`IngestEngine`] is the single entry point. Every playlist ingest, segment
//! ingest, deadline evaluation and snapshot takes the store lock once and runs
//! to completion, so units of work never interleave mid-mutation.

pub mod correlator;
pub mod deadline;
pub mod history;
pub mod model;
pub mod stats;
pub mod store;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{info, warn};

use crate::hls::parser::{parse_playlist, upload_path};
use crate::metrics;
use correlator::Correlation;
use deadline::{DeadlineScheduler, Evaluation};
use model::{DeadlineState, TrackingKey};
use stats::StreamMetrics;
use store::RevisionStore;

pub use correlator::{MatchResult, MatchRule};

/// Result of a playlist upload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlaylistOutcome {
    Tracked {
        key: TrackingKey,
        segments: usize,
        already_received: usize,
        /// Milliseconds until the arrival deadline, if one was armed
        deadline_in_ms: Option<u64>,
        /// Master revision whose variant entry this upload satisfied
        variant_of: Option<TrackingKey>,
    },
    /// Nothing to track in this upload
    NotAPlaylist { variant_of: Option<TrackingKey> },
}

/// Result of a segment upload
pub type SegmentOutcome = Correlation;

/// Shared handle to the tracking engine
#[derive(Clone)]
pub struct IngestEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Mutex<RevisionStore>,
    scheduler: DeadlineScheduler,
    arrival_buffer: Duration,
}

impl IngestEngine {
    /// Create an engine whose deadlines allow `arrival_buffer` beyond the
    /// playlist target duration.
    pub fn new(arrival_buffer: Duration) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: Mutex::new(RevisionStore::new()),
                scheduler: DeadlineScheduler::new(),
                arrival_buffer,
            }),
        }
    }

    /// Track a newly uploaded playlist revision and arm its deadline.
    ///
    /// The upload also satisfies the matching variant entry of any master
    /// revision in the channel. Must be called from within a tokio runtime.
    pub fn ingest_playlist(
        &self,
        channel_id: &str,
        playlist_path: &str,
        raw: &[u8],
        now_ms: u64,
    ) -> PlaylistOutcome {
        let parsed = parse_playlist(raw, playlist_path, channel_id);
        let path = upload_path(playlist_path);

        let mut store = self.inner.lock_store();
        let variant = correlator::correlate_variant(&mut store, channel_id, &path, raw.len() as u64, now_ms);
        if let Some(variant) = &variant {
            metrics::record_segment("variant");
            if variant.completed {
                info!("All variants of {} received", variant.key);
            }
        }
        let variant_of = variant.map(|v| v.key);

        let Some(parsed) = parsed else {
            drop(store);
            metrics::record_not_a_playlist();
            return PlaylistOutcome::NotAPlaylist { variant_of };
        };

        let key = TrackingKey::new(channel_id, playlist_path);
        let revision = store.ingest(key.clone(), &parsed, now_ms);

        let mut deadline_in_ms = None;
        if !revision.all_segments_received && !revision.segments.is_empty() {
            let delay = Duration::from_secs(revision.target_duration_secs) + self.inner.arrival_buffer;
            let weak = Arc::downgrade(&self.inner);
            let timer_key = key.clone();
            match self
                .inner
                .scheduler
                .arm(delay, move |id| on_deadline(&weak, &timer_key, id))
            {
                Some(handle) => {
                    deadline_in_ms = Some(handle.due_in().as_millis() as u64);
                    revision.deadline = Some(handle);
                    revision.deadline_state = DeadlineState::Armed;
                }
                None => warn!("Scheduler is shut down, {} will not time out", key),
            }
        }

        let outcome = PlaylistOutcome::Tracked {
            key: key.clone(),
            segments: revision.segments.len(),
            already_received: revision.received_count(),
            deadline_in_ms,
            variant_of,
        };
        drop(store);

        metrics::record_playlist();
        match deadline_in_ms {
            Some(ms) => info!(
                "Tracking {} ({} segments, deadline in {}ms)",
                key,
                parsed.entries.len(),
                ms
            ),
            None => info!(
                "Tracking {} ({} segments, no deadline)",
                key,
                parsed.entries.len()
            ),
        }
        outcome
    }

    /// Correlate an uploaded segment with the channel's expectations.
    pub fn ingest_segment(
        &self,
        channel_id: &str,
        segment_path: &str,
        size_bytes: u64,
        now_ms: u64,
    ) -> SegmentOutcome {
        let path = upload_path(segment_path);
        let outcome = {
            let mut store = self.inner.lock_store();
            correlator::correlate(&mut store, channel_id, &path, size_bytes, now_ms)
        };

        match &outcome {
            Correlation::Matched(result) => {
                metrics::record_segment(result.rule.as_str());
                if result.completed {
                    info!("All segments of {} received", result.key);
                }
            }
            Correlation::AlreadyReceived { key, .. } => {
                metrics::record_segment("already_received");
                info!("Segment {} already received for {}", path, key);
            }
            Correlation::Unmatched => {
                metrics::record_segment("unmatched");
                warn!(
                    "Segment {} on channel {} matches no tracked playlist",
                    path, channel_id
                );
            }
        }
        outcome
    }

    /// Statistics for every tracked playlist, ordered by channel then playlist
    pub fn snapshot_metrics(&self) -> Vec<StreamMetrics> {
        let store = self.inner.lock_store();
        let mut snapshot: Vec<StreamMetrics> =
            store.revisions().map(StreamMetrics::from_revision).collect();
        drop(store);
        snapshot.sort_by(|a, b| {
            (a.channel_id.as_str(), a.playlist.as_str())
                .cmp(&(b.channel_id.as_str(), b.playlist.as_str()))
        });
        snapshot
    }

    /// Uploads per channel that matched no expectation
    pub fn unmatched_counts(&self) -> BTreeMap<String, u64> {
        self.inner.lock_store().unmatched_counts()
    }

    pub fn tracked_playlists(&self) -> usize {
        self.inner.lock_store().len()
    }

    /// Run `f` against the live revision for `key`
    pub fn inspect<R>(
        &self,
        key: &TrackingKey,
        f: impl FnOnce(&model::PlaylistRevision) -> R,
    ) -> Option<R> {
        self.inner.lock_store().get(key).map(f)
    }

    /// Cancel every outstanding deadline and wait for the timer tasks to exit
    pub async fn shutdown(&self) {
        let cancelled = self.inner.lock_store().cancel_all_deadlines();
        self.inner.scheduler.shutdown().await;
        info!("Tracking engine stopped, {} deadlines cancelled", cancelled);
    }
}

impl EngineInner {
    fn lock_store(&self) -> MutexGuard<'_, RevisionStore> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn on_deadline(engine: &Weak<EngineInner>, key: &TrackingKey, deadline_id: u64) {
    let Some(engine) = engine.upgrade() else {
        return;
    };
    let mut store = engine.lock_store();
    let Some(revision) = store.get_mut(key) else {
        return;
    };

    match deadline::evaluate(revision, deadline_id) {
        Evaluation::Stale => {}
        Evaluation::Completed => info!("Deadline for {} passed with all segments in", key),
        Evaluation::TimedOut { missing } => {
            metrics::record_timeouts(missing as u64);
            warn!(
                "Deadline for {} expired with {} segment(s) missing (streak {}, max {})",
                key,
                missing,
                revision.consecutive_timeout_streak,
                revision.max_consecutive_timeout_streak
            );
        }
    }
}
