//! Physics error type
//!
//! Only start-up failures are surfaced as errors. Everything that goes wrong
//! while the simulation is running is logged and skipped.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read physics configuration {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse physics configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Failed to spawn simulation thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
