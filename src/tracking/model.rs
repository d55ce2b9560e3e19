use serde::Serialize;
use std::fmt;

use super::deadline::DeadlineHandle;
use crate::hls::parser::normalize_path;
use super::history::BoundedHistory;

/// Identifies "the same" playlist across revisions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackingKey {
    pub channel_id: String,
    /// Playlist path relative to the channel, without the `.m3u8` extension
    pub playlist: String,
}

impl TrackingKey {
    pub fn new(channel_id: impl Into<String>, playlist_path: &str) -> Self {
        let trimmed = playlist_path.trim_matches('/');
        let playlist = trimmed
            .strip_suffix(".m3u8")
            .or_else(|| trimmed.strip_suffix(".M3U8"))
            .unwrap_or(trimmed);
        Self {
            channel_id: channel_id.into(),
            playlist: playlist.to_string(),
        }
    }

    /// Last path component of the playlist base name
    pub fn playlist_name(&self) -> &str {
        self.playlist.rsplit('/').next().unwrap_or(&self.playlist)
    }

    /// Channel-relative directory holding the playlist, empty at the root
    pub fn directory(&self) -> &str {
        self.playlist.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    /// Channel-relative path of a reference declared by this playlist
    pub fn resolve(&self, reference: &str) -> String {
        match self.directory() {
            "" => normalize_path(reference),
            dir => normalize_path(&format!("{}/{}", dir, reference)),
        }
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.playlist)
    }
}

/// One segment a playlist revision declares as forthcoming
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentExpectation {
    /// Reference as declared by the playlist
    pub identity: String,
    /// Channel-relative path the upload is expected at
    pub path: String,
    pub nominal_duration_secs: f64,
    pub received: bool,
    pub received_at_ms: Option<u64>,
    pub size_bytes: Option<u64>,
    pub first_advertised_at_ms: u64,
    pub timed_out: bool,
}

impl SegmentExpectation {
    /// Expectation for a playlist at the channel root, where the declared
    /// reference is also the upload path
    pub fn new(identity: impl Into<String>, nominal_duration_secs: f64, now_ms: u64) -> Self {
        let identity = identity.into();
        Self {
            path: identity.clone(),
            identity,
            nominal_duration_secs,
            received: false,
            received_at_ms: None,
            size_bytes: None,
            first_advertised_at_ms: now_ms,
            timed_out: false,
        }
    }
}

/// Lifecycle of a revision's arrival deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineState {
    /// Nothing to wait for (empty revision or scheduler shut down)
    Idle,
    Armed,
    Evaluating,
    Completed,
    TimedOut,
}

impl DeadlineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineState::Idle => "idle",
            DeadlineState::Armed => "armed",
            DeadlineState::Evaluating => "evaluating",
            DeadlineState::Completed => "completed",
            DeadlineState::TimedOut => "timed_out",
        }
    }
}

/// Live tracking state for one playlist within one channel
#[derive(Debug)]
pub struct PlaylistRevision {
    pub key: TrackingKey,
    pub playlist_uri: String,
    pub target_duration_secs: u64,
    /// Playlist order; identities are unique
    pub segments: Vec<SegmentExpectation>,
    /// Entries are variant playlists rather than media segments
    pub is_master: bool,
    pub all_segments_received: bool,
    pub revision_received_at_ms: u64,
    pub last_segment_received_at_ms: u64,
    pub(crate) deadline: Option<DeadlineHandle>,
    pub deadline_state: DeadlineState,
    /// Ingest timestamps, newest first
    pub revision_history: BoundedHistory<u64>,
    pub timeout_event_count: u64,
    pub consecutive_timeout_streak: u64,
    pub max_consecutive_timeout_streak: u64,
    /// Gaps between consecutive segment arrivals in ms, oldest first
    pub arrival_intervals: BoundedHistory<u64>,
    /// Store-wide ingest order, breaks timestamp ties
    pub ingest_seq: u64,
}

impl PlaylistRevision {
    pub fn segment(&self, identity: &str) -> Option<&SegmentExpectation> {
        self.segments.iter().find(|s| s.identity == identity)
    }

    /// Expectation resolved to the channel-relative `path`
    pub fn segment_at(&self, path: &str) -> Option<&SegmentExpectation> {
        self.segments.iter().find(|s| s.path == path)
    }

    pub fn received_count(&self) -> usize {
        self.segments.iter().filter(|s| s.received).count()
    }

    pub fn missing_count(&self) -> usize {
        self.segments.len() - self.received_count()
    }

    pub fn has_pending_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn pending_deadline_id(&self) -> Option<u64> {
        self.deadline.as_ref().map(DeadlineHandle::id)
    }

    /// Unreceived expectations with their positions, in playlist order
    pub(crate) fn unreceived(&self) -> impl Iterator<Item = (usize, &SegmentExpectation)> {
        self.segments.iter().enumerate().filter(|(_, s)| !s.received)
    }

    /// Recompute `all_segments_received` from the segments. An empty
    /// revision is never complete.
    pub(crate) fn recompute_completion(&mut self) -> bool {
        self.all_segments_received =
            !self.segments.is_empty() && self.segments.iter().all(|s| s.received);
        self.all_segments_received
    }

    /// Abort and clear the pending deadline, if any
    pub(crate) fn cancel_deadline(&mut self) {
        if let Some(handle) = self.deadline.take() {
            handle.cancel();
        }
    }

    /// Orders revisions newest first: later ingest time, then later sequence
    pub(crate) fn recency(&self) -> (u64, u64) {
        (self.revision_received_at_ms, self.ingest_seq)
    }
}
