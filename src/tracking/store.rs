use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::history::BoundedHistory;
use super::model::{DeadlineState, PlaylistRevision, SegmentExpectation, TrackingKey};
use crate::hls::parser::ParsedPlaylist;

/// Owns every tracked playlist revision.
///
/// Only [`RevisionStore::ingest`] replaces a revision; everything else
/// mutates fields of an existing one in place.
#[derive(Debug, Default)]
pub struct RevisionStore {
    revisions: HashMap<TrackingKey, PlaylistRevision>,
    unmatched: BTreeMap<String, u64>,
    next_seq: u64,
}

impl RevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the revision for `key` with one built from `parsed`, carrying
    /// observed segment state and tracking-key counters forward.
    ///
    /// The previous revision's deadline is cancelled before the new revision
    /// is stored. Arming the new deadline is left to the caller.
    pub fn ingest(
        &mut self,
        key: TrackingKey,
        parsed: &ParsedPlaylist,
        now_ms: u64,
    ) -> &mut PlaylistRevision {
        let existing = self.revisions.remove(&key).map(|mut previous| {
            previous.cancel_deadline();
            previous
        });

        self.next_seq += 1;
        let revision = merge_revision(key.clone(), parsed, existing, now_ms, self.next_seq);
        debug!(
            "Stored revision #{} for {}: {} segments, {} already received",
            revision.ingest_seq,
            key,
            revision.segments.len(),
            revision.received_count()
        );

        self.revisions.entry(key).insert_entry(revision).into_mut()
    }

    pub fn get(&self, key: &TrackingKey) -> Option<&PlaylistRevision> {
        self.revisions.get(key)
    }

    pub fn get_mut(&mut self, key: &TrackingKey) -> Option<&mut PlaylistRevision> {
        self.revisions.get_mut(key)
    }

    pub fn revisions(&self) -> impl Iterator<Item = &PlaylistRevision> {
        self.revisions.values()
    }

    /// Revisions belonging to `channel_id`, newest first
    pub fn channel_revisions(&self, channel_id: &str) -> Vec<&PlaylistRevision> {
        let mut revisions: Vec<_> = self
            .revisions
            .values()
            .filter(|rev| rev.key.channel_id == channel_id)
            .collect();
        revisions.sort_by(|a, b| b.recency().cmp(&a.recency()));
        revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn record_unmatched(&mut self, channel_id: &str) {
        *self.unmatched.entry(channel_id.to_string()).or_default() += 1;
    }

    pub fn unmatched_counts(&self) -> BTreeMap<String, u64> {
        self.unmatched.clone()
    }

    /// Cancel every armed deadline; used at shutdown
    pub fn cancel_all_deadlines(&mut self) -> usize {
        let mut cancelled = 0;
        for revision in self.revisions.values_mut() {
            if revision.has_pending_deadline() {
                revision.cancel_deadline();
                revision.deadline_state = DeadlineState::Idle;
                cancelled += 1;
            }
        }
        cancelled
    }
}

/// Build the next revision for `key`.
///
/// Identities still advertised keep their observed fields from `existing`;
/// identities that dropped out of the window are discarded with their state.
pub fn merge_revision(
    key: TrackingKey,
    parsed: &ParsedPlaylist,
    existing: Option<PlaylistRevision>,
    now_ms: u64,
    ingest_seq: u64,
) -> PlaylistRevision {
    let segments = parsed
        .entries
        .iter()
        .map(|entry| {
            let mut segment = SegmentExpectation::new(&entry.identity, entry.duration_secs, now_ms);
            segment.path = key.resolve(&entry.identity);
            if let Some(previous) = existing.as_ref().and_then(|rev| rev.segment(&entry.identity)) {
                segment.received = previous.received;
                segment.received_at_ms = previous.received_at_ms;
                segment.size_bytes = previous.size_bytes;
                segment.timed_out = previous.timed_out;
                segment.first_advertised_at_ms = previous.first_advertised_at_ms;
            }
            segment
        })
        .collect();

    let mut revision = match existing {
        Some(previous) => PlaylistRevision {
            key,
            playlist_uri: parsed.playlist_uri.clone(),
            target_duration_secs: parsed.target_duration_secs,
            segments,
            is_master: parsed.is_master,
            all_segments_received: false,
            revision_received_at_ms: now_ms,
            last_segment_received_at_ms: previous.last_segment_received_at_ms,
            deadline: None,
            deadline_state: DeadlineState::Idle,
            revision_history: previous.revision_history,
            timeout_event_count: previous.timeout_event_count,
            consecutive_timeout_streak: previous.consecutive_timeout_streak,
            max_consecutive_timeout_streak: previous.max_consecutive_timeout_streak,
            arrival_intervals: previous.arrival_intervals,
            ingest_seq,
        },
        None => PlaylistRevision {
            key,
            playlist_uri: parsed.playlist_uri.clone(),
            target_duration_secs: parsed.target_duration_secs,
            segments,
            is_master: parsed.is_master,
            all_segments_received: false,
            revision_received_at_ms: now_ms,
            last_segment_received_at_ms: 0,
            deadline: None,
            deadline_state: DeadlineState::Idle,
            revision_history: BoundedHistory::default(),
            timeout_event_count: 0,
            consecutive_timeout_streak: 0,
            max_consecutive_timeout_streak: 0,
            arrival_intervals: BoundedHistory::default(),
            ingest_seq,
        },
    };

    revision.revision_history.push_front(now_ms);
    if revision.recompute_completion() {
        revision.deadline_state = DeadlineState::Completed;
    }
    revision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::parser::PlaylistEntry;
    use crate::tracking::history::HISTORY_CAPACITY;

    fn parsed(ids: &[&str]) -> ParsedPlaylist {
        ParsedPlaylist {
            playlist_uri: "live.m3u8".to_string(),
            channel_id: "ch1".to_string(),
            target_duration_secs: 10,
            entries: ids
                .iter()
                .map(|id| PlaylistEntry {
                    identity: id.to_string(),
                    duration_secs: 10.0,
                })
                .collect(),
            is_master: false,
        }
    }

    fn key() -> TrackingKey {
        TrackingKey::new("ch1", "live.m3u8")
    }

    #[test]
    fn first_ingest_stamps_first_advertised() {
        let mut store = RevisionStore::new();
        let rev = store.ingest(key(), &parsed(&["seg1.ts", "seg2.ts"]), 1_000);

        assert_eq!(rev.segments.len(), 2);
        assert!(rev.segments.iter().all(|s| s.first_advertised_at_ms == 1_000));
        assert!(!rev.all_segments_received);
        assert_eq!(rev.revision_history.len(), 1);
        assert_eq!(rev.last_segment_received_at_ms, 0);
    }

    #[test]
    fn reingest_preserves_received_state() {
        let mut store = RevisionStore::new();
        let rev = store.ingest(key(), &parsed(&["seg1.ts", "seg2.ts"]), 1_000);
        rev.segments[0].received = true;
        rev.segments[0].received_at_ms = Some(1_500);
        rev.segments[0].size_bytes = Some(4_096);
        rev.last_segment_received_at_ms = 1_500;

        let rev = store.ingest(key(), &parsed(&["seg1.ts", "seg2.ts", "seg3.ts"]), 2_000);
        let seg1 = rev.segment("seg1.ts").unwrap();
        assert!(seg1.received);
        assert_eq!(seg1.received_at_ms, Some(1_500));
        assert_eq!(seg1.size_bytes, Some(4_096));
        assert_eq!(seg1.first_advertised_at_ms, 1_000);
        assert_eq!(rev.segment("seg3.ts").unwrap().first_advertised_at_ms, 2_000);
        assert_eq!(rev.last_segment_received_at_ms, 1_500);
    }

    #[test]
    fn identities_leaving_the_window_are_dropped() {
        let mut store = RevisionStore::new();
        let rev = store.ingest(key(), &parsed(&["seg1.ts", "seg2.ts"]), 1_000);
        rev.segments[0].received = true;

        let rev = store.ingest(key(), &parsed(&["seg2.ts", "seg3.ts"]), 2_000);
        assert!(rev.segment("seg1.ts").is_none());

        // Re-advertising seg1 starts from scratch
        let rev = store.ingest(key(), &parsed(&["seg1.ts"]), 3_000);
        let seg1 = rev.segment("seg1.ts").unwrap();
        assert!(!seg1.received);
        assert_eq!(seg1.first_advertised_at_ms, 3_000);
    }

    #[test]
    fn counters_carry_over() {
        let mut store = RevisionStore::new();
        let rev = store.ingest(key(), &parsed(&["seg1.ts"]), 1_000);
        rev.timeout_event_count = 4;
        rev.consecutive_timeout_streak = 2;
        rev.max_consecutive_timeout_streak = 3;
        rev.arrival_intervals.push_back(250);

        let rev = store.ingest(key(), &parsed(&["seg2.ts"]), 2_000);
        assert_eq!(rev.timeout_event_count, 4);
        assert_eq!(rev.consecutive_timeout_streak, 2);
        assert_eq!(rev.max_consecutive_timeout_streak, 3);
        assert_eq!(rev.arrival_intervals.len(), 1);
        assert_eq!(
            rev.revision_history.iter().copied().collect::<Vec<_>>(),
            vec![2_000, 1_000]
        );
    }

    #[test]
    fn fully_carried_revision_is_complete() {
        let mut store = RevisionStore::new();
        let rev = store.ingest(key(), &parsed(&["seg1.ts"]), 1_000);
        rev.segments[0].received = true;

        let rev = store.ingest(key(), &parsed(&["seg1.ts"]), 2_000);
        assert!(rev.all_segments_received);
        assert_eq!(rev.deadline_state, DeadlineState::Completed);
    }

    #[test]
    fn twenty_one_revisions_keep_twenty_history_entries() {
        let mut store = RevisionStore::new();
        for i in 0..21u64 {
            store.ingest(key(), &parsed(&["seg1.ts"]), 1_000 + i * 100);
        }
        let rev = store.get(&key()).unwrap();
        assert_eq!(rev.revision_history.len(), HISTORY_CAPACITY);
        assert_eq!(rev.revision_history.front(), Some(&3_000));
        assert_eq!(rev.revision_history.back(), Some(&1_100));
    }

    #[test]
    fn channel_revisions_newest_first() {
        let mut store = RevisionStore::new();
        store.ingest(TrackingKey::new("ch1", "a.m3u8"), &parsed(&["x.ts"]), 1_000);
        store.ingest(TrackingKey::new("ch1", "b.m3u8"), &parsed(&["y.ts"]), 1_000);
        store.ingest(TrackingKey::new("ch2", "c.m3u8"), &parsed(&["z.ts"]), 5_000);

        let revisions = store.channel_revisions("ch1");
        assert_eq!(revisions.len(), 2);
        // Same timestamp: later ingest sequence wins
        assert_eq!(revisions[0].key.playlist, "b");
        assert_eq!(revisions[1].key.playlist, "a");
    }

    #[test]
    fn unmatched_counts_per_channel() {
        let mut store = RevisionStore::new();
        store.record_unmatched("ch1");
        store.record_unmatched("ch1");
        store.record_unmatched("ch2");
        let counts = store.unmatched_counts();
        assert_eq!(counts["ch1"], 2);
        assert_eq!(counts["ch2"], 1);
    }
}
