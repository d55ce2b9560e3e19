//! End-to-end tests for the ingest mock
//!
//! Starts a real Axum server on a random port and drives it the way an HLS
//! publisher would: PUT a playlist, PUT its segments, then read the stats.

use hls_ingest_mock::clock::SystemClock;
use hls_ingest_mock::config::{Config, StorageBackend};
use hls_ingest_mock::server::build_router;
use hls_ingest_mock::server::state::AppState;
use hls_ingest_mock::storage::MemoryStorage;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ── Test server helpers ───────────────────────────────────────────────────────

/// Spin up a test server with in-memory storage and the given arrival buffer.
async fn start_server(arrival_buffer_ms: u64) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();

    let config = Config {
        port: 0,
        is_dev: true,
        storage_backend: StorageBackend::Memory,
        storage_dir: PathBuf::from("./ingest-data"),
        arrival_buffer_ms,
    };
    let state = AppState::with_parts(config, Arc::new(MemoryStorage::new()), Arc::new(SystemClock));
    let app = build_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn start_test_server() -> SocketAddr {
    start_server(2000).await
}

fn playlist(target_duration: u64, segments: &[&str]) -> String {
    let mut out = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:1\n",
        target_duration
    );
    for segment in segments {
        out.push_str(&format!("#EXTINF:{}.0,\n{}\n", target_duration, segment));
    }
    out
}

async fn put(client: &reqwest::Client, addr: SocketAddr, path: &str, body: Vec<u8>) -> reqwest::Response {
    client
        .put(format!("http://{}/in/{}", addr, path))
        .body(body)
        .send()
        .await
        .unwrap()
}

async fn stats(client: &reqwest::Client, addr: SocketAddr) -> serde_json::Value {
    client
        .get(format!("http://{}/stats", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key("x-ingest-mock-version"));

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn publisher_upload_cycle_completes_playlist() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let body = playlist(6, &["seg100.ts", "seg101.ts"]).into_bytes();
    let resp = put(&client, addr, "ch1/hd/live.m3u8", body).await;
    assert_eq!(resp.status(), 201);

    for name in ["seg100.ts", "seg101.ts"] {
        let resp = put(&client, addr, &format!("ch1/hd/{}", name), vec![7u8; 2048]).await;
        assert_eq!(resp.status(), 201);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["outcome"], "matched");
    }

    let json = stats(&client, addr).await;
    let stream = &json["streams"][0];
    assert_eq!(stream["playlist"], "hd/live");
    assert_eq!(stream["received_segments"], 2);
    assert_eq!(stream["all_segments_received"], true);
    assert_eq!(stream["deadline_state"], "completed");
    assert_eq!(stream["total_bytes"], 4096);
}

#[tokio::test]
async fn missing_segment_times_out() {
    // Zero buffer so the deadline is just the one-second target duration
    let addr = start_server(0).await;
    let client = reqwest::Client::new();

    let body = playlist(1, &["a.ts", "b.ts"]).into_bytes();
    let resp = put(&client, addr, "ch2/live.m3u8", body).await;
    assert_eq!(resp.status(), 201);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["deadline_in_ms"], 1000);

    let resp = put(&client, addr, "ch2/a.ts", vec![1u8; 10]).await;
    assert_eq!(resp.status(), 201);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let json = stats(&client, addr).await;
    let stream = &json["streams"][0];
    assert_eq!(stream["deadline_state"], "timed_out");
    assert_eq!(stream["received_segments"], 1);
    assert_eq!(stream["timed_out_segments"], 1);
    assert_eq!(stream["timeout_events"], 1);
    assert_eq!(stream["consecutive_timeouts"], 1);
}

#[tokio::test]
async fn report_is_plain_text() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let body = playlist(6, &["x1.ts"]).into_bytes();
    put(&client, addr, "ch3/main.m3u8", body).await;

    let resp = client
        .get(format!("http://{}/report", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let text = resp.text().await.unwrap();
    assert!(text.contains("[ch3] main"));
    assert!(text.contains("segments: 0/1 received"));
}
