use std::env;
use std::path::PathBuf;

/// Where uploaded bytes are persisted
#[derive(Clone, Debug, PartialEq)]
pub enum StorageBackend {
    /// Files under `storage_dir` (default)
    File,
    /// In-process map; uploads are lost on exit
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    pub storage_backend: StorageBackend,
    /// Root directory for the file backend
    pub storage_dir: PathBuf,
    /// Grace period added to a playlist's target duration before its
    /// segments count as timed out (default: 2000)
    pub arrival_buffer_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT is required,
    /// and STORAGE_DIR is required when the file backend is selected.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" | "mem" => StorageBackend::Memory,
            _ => StorageBackend::File,
        };

        let storage_dir = match env::var("STORAGE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) if is_dev || storage_backend == StorageBackend::Memory => {
                PathBuf::from("./ingest-data")
            }
            Err(_) => return Err("STORAGE_DIR is required in production".into()),
        };

        let arrival_buffer_ms: u64 = env::var("ARRIVAL_BUFFER_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .unwrap_or(2000);

        Ok(Config {
            port,
            is_dev,
            storage_backend,
            storage_dir,
            arrival_buffer_ms,
        })
    }
}
