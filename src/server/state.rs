use crate::{
    clock::{Clock, SystemClock},
    config::{Config, StorageBackend},
    metrics,
    storage::{FileStorage, MemoryStorage, Storage},
    tracking::IngestEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Playlist/segment tracking engine
    pub engine: IngestEngine,
    /// Sink for uploaded bytes
    pub storage: Arc<dyn Storage>,
    /// Timestamp source for ingests
    pub clock: Arc<dyn Clock>,
    /// Prometheus render handle, if the recorder could be installed
    pub prometheus: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the configured storage backend and the system clock
    pub fn new(config: Config) -> Self {
        let storage: Arc<dyn Storage> = match config.storage_backend {
            StorageBackend::File => {
                info!("Persisting uploads under {}", config.storage_dir.display());
                Arc::new(FileStorage::new(config.storage_dir.clone()))
            }
            StorageBackend::Memory => {
                info!("Keeping uploads in memory");
                Arc::new(MemoryStorage::new())
            }
        };
        Self::with_parts(config, storage, Arc::new(SystemClock))
    }

    /// Create an AppState with explicit storage and clock collaborators
    pub fn with_parts(config: Config, storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        let engine = IngestEngine::new(Duration::from_millis(config.arrival_buffer_ms));
        Self {
            config: Arc::new(config),
            engine,
            storage,
            clock,
            prometheus: metrics::install(),
            started_at: Instant::now(),
        }
    }
}
