pub mod clock;
pub mod config;
pub mod error;
pub mod hls;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod tracking;
