use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hls_ingest_mock::hls::parser::parse_playlist;
use hls_ingest_mock::tracking::correlator::correlate;
use hls_ingest_mock::tracking::model::TrackingKey;
use hls_ingest_mock::tracking::store::RevisionStore;

const SEGMENTS_PER_PLAYLIST: usize = 6;

fn media_playlist(rendition: usize, first_seq: usize) -> String {
    let mut out = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:{}\n",
        first_seq
    );
    for seq in first_seq..first_seq + SEGMENTS_PER_PLAYLIST {
        out.push_str(&format!("#EXTINF:6.0,\nr{}_seg{}.ts\n", rendition, seq));
    }
    out
}

/// One channel carrying `renditions` media playlists
fn populated_store(renditions: usize) -> RevisionStore {
    let mut store = RevisionStore::new();
    for rendition in 0..renditions {
        let path = format!("r{}.m3u8", rendition);
        let raw = media_playlist(rendition, 100);
        if let Some(parsed) = parse_playlist(raw.as_bytes(), &path, "ch1") {
            store.ingest(TrackingKey::new("ch1", &path), &parsed, 1_000);
        }
    }
    store
}

fn bench_parse(c: &mut Criterion) {
    let raw = media_playlist(0, 1000);
    c.bench_function("parse_media_playlist", |b| {
        b.iter(|| parse_playlist(black_box(raw.as_bytes()), "r0.m3u8", "ch1"))
    });
}

fn bench_correlate(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlate");

    for renditions in [1usize, 8, 32] {
        let last = renditions - 1;

        group.bench_with_input(BenchmarkId::new("exact", renditions), &renditions, |b, &n| {
            b.iter_batched(
                || populated_store(n),
                |mut store| correlate(&mut store, "ch1", &format!("r{}_seg103.ts", last), 4096, 2_000),
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("base_name", renditions), &renditions, |b, &n| {
            b.iter_batched(
                || populated_store(n),
                |mut store| {
                    correlate(&mut store, "ch1", &format!("r{}_seg103_9.ts", last), 4096, 2_000)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("unmatched", renditions), &renditions, |b, &n| {
            b.iter_batched(
                || populated_store(n),
                |mut store| correlate(&mut store, "ch1", "unknown.ts", 4096, 2_000),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_reingest(c: &mut Criterion) {
    let next = media_playlist(0, 101);
    c.bench_function("reingest_sliding_window", |b| {
        b.iter_batched(
            || {
                let store = populated_store(1);
                let parsed = parse_playlist(next.as_bytes(), "r0.m3u8", "ch1");
                (store, parsed)
            },
            |(mut store, parsed)| {
                if let Some(parsed) = parsed {
                    store.ingest(TrackingKey::new("ch1", "r0.m3u8"), &parsed, 7_000);
                }
                store
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_parse, bench_correlate, bench_reingest);
criterion_main!(benches);
