pub mod handlers;
pub mod state;

use crate::config::Config;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue},
    middleware,
    response::Response,
    routing::get,
};
use state::AppState;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Largest accepted upload; segments of high-bitrate renditions run to tens of MB
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Build the router with all routes; used by [`start`] and by tests
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/stats", get(handlers::stats::stats))
        .route("/report", get(handlers::stats::report))
        .route("/metrics", get(handlers::stats::prometheus))
        .route(
            "/in/{channel_id}/{*path}",
            get(handlers::ingest::method_not_allowed)
                .put(handlers::ingest::upload)
                .post(handlers::ingest::upload)
                .delete(handlers::ingest::delete),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::map_response(add_version_header))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn add_version_header(mut response: Response) -> Response {
    response.headers_mut().insert(
        HeaderName::from_static("x-ingest-mock-version"),
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Start the Axum HTTP server and run until Ctrl-C
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);

    let state = AppState::new(config);
    let engine = state.engine.clone();
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("Ingest endpoint listening on http://{}/in/{{channel}}/", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Timers must not fire against a store that is being torn down
    engine.shutdown().await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
