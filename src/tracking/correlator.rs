//! Matching uploaded segment files to playlist expectations.
//!
//! Rules run in priority order and the first hit wins:
//!
//! 1. **Exact**: an unreceived expectation resolved to the upload's
//!    channel-relative path, then one with the same file name.
//! 2. **Base name**: the upload carries a trailing `_<digits>` counter the
//!    playlist does not (`seg1_7.ts` for `seg1.ts`), or the counter is
//!    appended to the playlist's own name (`stream_1_42.ts` for `stream_1.m3u8`).
//! 3. **Affix**: one stem is a prefix of the other.
//!
//! File-name comparisons (the second half of rule 1, rules 2 and 3) only
//! consider expectations in the upload's directory when any exist there, so
//! renditions laid out as `hd/seg1.ts` and `sd/seg1.ts` never trade segments.
//! Master revisions are only matched by [`correlate_variant`].
//!
//! Rules 2 and 3 are best-effort. When several expectations share a base
//! name the newest revision wins, which can misattribute a segment.

use serde::Serialize;
use tracing::{debug, info};

use super::model::{DeadlineState, PlaylistRevision, SegmentExpectation, TrackingKey};
use super::store::RevisionStore;

/// Which rule resolved a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Exact,
    BaseName,
    Affix,
}

impl MatchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRule::Exact => "exact",
            MatchRule::BaseName => "base_name",
            MatchRule::Affix => "affix",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub key: TrackingKey,
    /// Identity of the expectation that was satisfied
    pub segment: String,
    pub rule: MatchRule,
    /// The owning revision became fully received with this segment
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Correlation {
    Matched(MatchResult),
    /// Identity was already received; nothing changed
    AlreadyReceived { key: TrackingKey, segment: String },
    Unmatched,
}

#[derive(Debug, PartialEq)]
enum Lookup {
    Found {
        key: TrackingKey,
        index: usize,
        rule: MatchRule,
    },
    AlreadyReceived(TrackingKey),
    NotFound,
}

/// Correlate an uploaded segment and apply the arrival to its revision.
///
/// `upload_path` is the channel-relative path the segment was stored under.
pub fn correlate(
    store: &mut RevisionStore,
    channel_id: &str,
    upload_path: &str,
    size_bytes: u64,
    now_ms: u64,
) -> Correlation {
    match find_match(store, channel_id, upload_path) {
        Lookup::Found { key, index, rule } => {
            let Some(revision) = store.get_mut(&key) else {
                return Correlation::Unmatched;
            };
            let segment = revision.segments[index].identity.clone();
            let completed = apply_arrival(revision, index, size_bytes, now_ms);

            if rule != MatchRule::Exact {
                info!(
                    "Upload {} matched {} in {} via {} rule",
                    upload_path,
                    segment,
                    key,
                    rule.as_str()
                );
            }

            Correlation::Matched(MatchResult {
                key,
                segment,
                rule,
                completed,
            })
        }
        Lookup::AlreadyReceived(key) => Correlation::AlreadyReceived {
            key,
            segment: upload_path.to_string(),
        },
        Lookup::NotFound => {
            store.record_unmatched(channel_id);
            Correlation::Unmatched
        }
    }
}

/// Mark the variant entry of a master revision that an uploaded playlist
/// at `upload_path` satisfies.
///
/// Only exact channel-relative paths match. Returns `None` when no master
/// revision in the channel is waiting for this playlist.
pub fn correlate_variant(
    store: &mut RevisionStore,
    channel_id: &str,
    upload_path: &str,
    size_bytes: u64,
    now_ms: u64,
) -> Option<MatchResult> {
    let (key, index) = store
        .channel_revisions(channel_id)
        .into_iter()
        .filter(|rev| rev.is_master && !rev.all_segments_received)
        .find_map(|rev| {
            rev.unreceived()
                .find(|(_, s)| s.path == upload_path)
                .map(|(index, _)| (rev.key.clone(), index))
        })?;

    let revision = store.get_mut(&key)?;
    let segment = revision.segments[index].identity.clone();
    let completed = apply_arrival(revision, index, size_bytes, now_ms);
    debug!("Variant {} of {} uploaded", segment, key);

    Some(MatchResult {
        key,
        segment,
        rule: MatchRule::Exact,
        completed,
    })
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

fn file_name(segment: &SegmentExpectation) -> &str {
    split_path(&segment.path).1
}

fn find_match(store: &RevisionStore, channel_id: &str, upload_path: &str) -> Lookup {
    let all: Vec<&PlaylistRevision> = store
        .channel_revisions(channel_id)
        .into_iter()
        .filter(|rev| !rev.is_master)
        .collect();
    let candidates: Vec<&PlaylistRevision> = all
        .iter()
        .copied()
        .filter(|rev| !rev.all_segments_received)
        .collect();

    // Rule 1, directory-qualified
    for revision in &candidates {
        if let Some((index, _)) = revision.unreceived().find(|(_, s)| s.path == upload_path) {
            return Lookup::Found {
                key: revision.key.clone(),
                index,
                rule: MatchRule::Exact,
            };
        }
    }

    // A repeated upload must not fall through to the name-based rules
    if let Some(revision) = all
        .iter()
        .find(|rev| rev.segment_at(upload_path).is_some_and(|s| s.received))
    {
        debug!("{} already received in {}", upload_path, revision.key);
        return Lookup::AlreadyReceived(revision.key.clone());
    }

    let (upload_dir, name) = split_path(upload_path);
    let scoped = all
        .iter()
        .flat_map(|rev| rev.segments.iter())
        .any(|s| split_path(&s.path).0 == upload_dir);
    let in_scope = |s: &SegmentExpectation| !scoped || split_path(&s.path).0 == upload_dir;

    // Rule 1, bare file name
    for revision in &candidates {
        if let Some((index, _)) = revision
            .unreceived()
            .find(|(_, s)| in_scope(s) && file_name(s) == name)
        {
            return Lookup::Found {
                key: revision.key.clone(),
                index,
                rule: MatchRule::Exact,
            };
        }
    }

    if let Some(revision) = all.iter().find(|rev| {
        rev.segments
            .iter()
            .any(|s| s.received && in_scope(s) && file_name(s) == name)
    }) {
        debug!("{} already received in {}", upload_path, revision.key);
        return Lookup::AlreadyReceived(revision.key.clone());
    }

    let raw_stem = file_stem(name);

    // Rule 2
    if let Some(base) = strip_sequence_suffix(raw_stem) {
        for revision in &candidates {
            if let Some((index, _)) = revision
                .unreceived()
                .find(|(_, s)| in_scope(s) && file_stem(file_name(s)) == base)
            {
                return Lookup::Found {
                    key: revision.key.clone(),
                    index,
                    rule: MatchRule::BaseName,
                };
            }
        }

        for revision in &candidates {
            if revision.key.playlist_name() != base {
                continue;
            }
            if let Some((index, _)) = revision.unreceived().find(|(_, s)| in_scope(s)) {
                return Lookup::Found {
                    key: revision.key.clone(),
                    index,
                    rule: MatchRule::BaseName,
                };
            }
        }
    }

    // Rule 3
    if !raw_stem.is_empty() {
        for revision in &candidates {
            let hit = revision.unreceived().find(|(_, s)| {
                let stem = file_stem(file_name(s));
                in_scope(s)
                    && !stem.is_empty()
                    && (stem.starts_with(raw_stem) || raw_stem.starts_with(stem))
            });
            if let Some((index, _)) = hit {
                return Lookup::Found {
                    key: revision.key.clone(),
                    index,
                    rule: MatchRule::Affix,
                };
            }
        }
    }

    Lookup::NotFound
}

/// Record an arrival on `revision.segments[index]`.
///
/// Returns `true` when this arrival completed the revision, in which case the
/// pending deadline has been cancelled.
fn apply_arrival(
    revision: &mut PlaylistRevision,
    index: usize,
    size_bytes: u64,
    now_ms: u64,
) -> bool {
    let segment = &mut revision.segments[index];
    if segment.received {
        return false;
    }
    segment.received = true;
    segment.received_at_ms = Some(now_ms);
    segment.size_bytes = Some(size_bytes);

    revision.consecutive_timeout_streak = 0;
    if revision.last_segment_received_at_ms > 0 {
        revision
            .arrival_intervals
            .push_back(now_ms.saturating_sub(revision.last_segment_received_at_ms));
    }
    revision.last_segment_received_at_ms = now_ms;

    if revision.recompute_completion() {
        revision.cancel_deadline();
        revision.deadline_state = DeadlineState::Completed;
        true
    } else {
        false
    }
}

/// File name without its final extension (`seg1.ts` → `seg1`)
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Strip a trailing `_<digits>` counter (`seg1_7` → `seg1`)
pub fn strip_sequence_suffix(stem: &str) -> Option<&str> {
    let (base, counter) = stem.rsplit_once('_')?;
    if base.is_empty() || counter.is_empty() || !counter.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(base)
}
