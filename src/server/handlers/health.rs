use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// Liveness probe with a summary of tracked state
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tracked_playlists": state.engine.tracked_playlists(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}
