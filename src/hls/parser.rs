use m3u8_rs::{Playlist, parse_playlist_res};
use tracing::{debug, info};
use url::Url;

/// Target duration used when a playlist does not declare `#EXT-X-TARGETDURATION`
pub const DEFAULT_TARGET_DURATION_SECS: u64 = 6;

/// One advertised entry: a media segment or a master-playlist variant
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    /// Reference as declared, relative to the playlist's directory, with the
    /// query stripped and `.`/`..` folded (`seg1.ts`, `hd/index.m3u8`)
    pub identity: String,
    /// `#EXTINF` duration, or the target duration for variants
    pub duration_secs: f64,
}

/// Result of parsing one uploaded playlist
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlaylist {
    pub playlist_uri: String,
    pub channel_id: String,
    pub target_duration_secs: u64,
    /// Entries in playlist order, identities unique (first occurrence wins)
    pub entries: Vec<PlaylistEntry>,
    pub is_master: bool,
}

/// Parse raw playlist bytes into the set of expected segment identities.
///
/// Returns `None` when the bytes are not a playlist m3u8-rs understands or
/// when the playlist advertises no segments or variants. That is the
/// "nothing to track" outcome, not an error.
pub fn parse_playlist(raw: &[u8], playlist_uri: &str, channel_id: &str) -> Option<ParsedPlaylist> {
    let playlist = match parse_playlist_res(raw) {
        Ok(playlist) => playlist,
        Err(e) => {
            debug!("{} is not a parseable playlist: {:?}", playlist_uri, e);
            return None;
        }
    };

    let (target_duration_secs, raw_entries, is_master) = match playlist {
        Playlist::MediaPlaylist(media) => {
            let target = effective_target_duration(media.target_duration as f64);
            let entries = media
                .segments
                .iter()
                .map(|segment| (segment.uri.as_str(), segment.duration as f64))
                .map(|(uri, duration)| (segment_identity(uri), duration))
                .collect::<Vec<_>>();
            (target, entries, false)
        }
        Playlist::MasterPlaylist(master) => {
            // Master playlists carry no target duration of their own
            let target = DEFAULT_TARGET_DURATION_SECS;
            let entries = master
                .variants
                .iter()
                .filter(|variant| !variant.is_i_frame)
                .map(|variant| (segment_identity(&variant.uri), target as f64))
                .collect::<Vec<_>>();
            (target, entries, true)
        }
    };

    let mut entries: Vec<PlaylistEntry> = Vec::with_capacity(raw_entries.len());
    for (identity, duration_secs) in raw_entries {
        if identity.is_empty() || entries.iter().any(|e| e.identity == identity) {
            continue;
        }
        entries.push(PlaylistEntry {
            identity,
            duration_secs,
        });
    }

    if entries.is_empty() {
        info!("Playlist {} advertises no segments, not tracking", playlist_uri);
        return None;
    }

    Some(ParsedPlaylist {
        playlist_uri: playlist_uri.to_string(),
        channel_id: channel_id.to_string(),
        target_duration_secs,
        entries,
        is_master,
    })
}

fn effective_target_duration(declared: f64) -> u64 {
    if declared.is_finite() && declared > 0.0 {
        declared.ceil() as u64
    } else {
        DEFAULT_TARGET_DURATION_SECS
    }
}

/// Reduce a declared URI to the reference a publisher uploads it under.
///
/// Relative references keep their directories (`hd/index.m3u8`) so renditions
/// sharing file names stay distinct. Absolute URLs and root-relative paths
/// point outside the ingest tree and keep only their last path segment.
/// Query strings and fragments are dropped.
pub fn segment_identity(uri: &str) -> String {
    let uri = uri.trim();

    if let Ok(url) = Url::parse(uri)
        && let Some(last) = url.path_segments().and_then(|mut s| s.next_back())
    {
        return last.to_string();
    }

    let path = strip_query(uri);
    if path.starts_with('/') {
        return path.rsplit('/').next().unwrap_or(path).to_string();
    }
    normalize_path(path)
}

/// Channel-relative path of an upload, normalized like declared references
pub fn upload_path(path: &str) -> String {
    normalize_path(strip_query(path.trim()))
}

/// Fold `.` and `..` components and drop empty ones. `..` never climbs above
/// the start of the path.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

fn strip_query(uri: &str) -> &str {
    uri.split(['?', '#']).next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:10.0,
seg1.ts
#EXTINF:9.5,
seg2.ts
";

    #[test]
    fn media_playlist_entries_and_durations() {
        let parsed = parse_playlist(MEDIA.as_bytes(), "live.m3u8", "ch1").unwrap();
        assert_eq!(parsed.target_duration_secs, 10);
        assert!(!parsed.is_master);
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].identity, "seg1.ts");
        assert_eq!(parsed.entries[0].duration_secs, 10.0);
        assert_eq!(parsed.entries[1].identity, "seg2.ts");
        assert_eq!(parsed.entries[1].duration_secs, 9.5);
    }

    #[test]
    fn entry_count_matches_extinf_count() {
        let mut text = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n");
        for i in 0..7 {
            text.push_str(&format!("#EXTINF:{}.0,\nchunk_{}.ts\n", i + 1, i));
        }
        let parsed = parse_playlist(text.as_bytes(), "p.m3u8", "ch").unwrap();
        assert_eq!(parsed.entries.len(), 7);
        for (i, entry) in parsed.entries.iter().enumerate() {
            assert_eq!(entry.duration_secs, (i + 1) as f64);
        }
    }

    #[test]
    fn missing_target_duration_uses_default() {
        let text = "#EXTM3U\n#EXTINF:2.0,\na.ts\n#EXTINF:2.0,\nb.ts\n#EXTINF:2.0,\nc.ts\n";
        let parsed = parse_playlist(text.as_bytes(), "p.m3u8", "ch").unwrap();
        assert_eq!(parsed.target_duration_secs, DEFAULT_TARGET_DURATION_SECS);
    }

    #[test]
    fn master_playlist_variants_become_pseudo_segments() {
        let text = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720
hd/index.m3u8
";
        let parsed = parse_playlist(text.as_bytes(), "master.m3u8", "ch").unwrap();
        assert!(parsed.is_master);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].identity, "hd/index.m3u8");
        assert_eq!(
            parsed.entries[0].duration_secs,
            DEFAULT_TARGET_DURATION_SECS as f64
        );
    }

    #[test]
    fn playlist_without_segments_is_not_tracked() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n";
        assert!(parse_playlist(text.as_bytes(), "p.m3u8", "ch").is_none());
    }

    #[test]
    fn garbage_is_not_a_playlist() {
        assert!(parse_playlist(b"not a playlist", "p.m3u8", "ch").is_none());
        assert!(parse_playlist(b"", "p.m3u8", "ch").is_none());
    }

    #[test]
    fn duplicate_identities_keep_first() {
        let text = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\na.ts\n#EXTINF:3.0,\na.ts\n";
        let parsed = parse_playlist(text.as_bytes(), "p.m3u8", "ch").unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].duration_secs, 4.0);
    }

    #[test]
    fn variants_sharing_a_file_name_stay_distinct() {
        let text = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
hd/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1500000,RESOLUTION=960x540
sd/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=400000,RESOLUTION=480x270
ld/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=400000,RESOLUTION=480x270
./ld/index.m3u8
";
        let parsed = parse_playlist(text.as_bytes(), "master.m3u8", "ch").unwrap();
        let ids: Vec<_> = parsed.entries.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(ids, ["hd/index.m3u8", "sd/index.m3u8", "ld/index.m3u8"]);
    }

    #[test]
    fn identity_keeps_relative_paths_and_strips_queries() {
        assert_eq!(segment_identity("seg1.ts"), "seg1.ts");
        assert_eq!(segment_identity("hd/seg1.ts"), "hd/seg1.ts");
        assert_eq!(segment_identity("./hd/../sd/seg1.ts"), "sd/seg1.ts");
        assert_eq!(segment_identity("seg1.ts?token=abc"), "seg1.ts");
        assert_eq!(segment_identity("/live/seg2.ts"), "seg2.ts");
        assert_eq!(
            segment_identity("https://cdn.example.com/live/seg9.ts?x=1"),
            "seg9.ts"
        );
    }

    #[test]
    fn upload_paths_are_normalized() {
        assert_eq!(upload_path("hd/seg1.ts"), "hd/seg1.ts");
        assert_eq!(upload_path("/hd//seg1.ts?x=1"), "hd/seg1.ts");
        assert_eq!(upload_path("../seg1.ts"), "seg1.ts");
        assert_eq!(normalize_path("a/./b/../c"), "a/c");
    }
}
