//! bl-results: durable run state and experiment records.

pub mod hash;
pub mod records;
pub mod state;
pub mod types;

pub use hash::config_fingerprint;
pub use records::RecordStore;
pub use state::{FileStore, MemoryStore, StateStore, delete_state, load_state, save_state};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid state key '{key}'")]
    InvalidKey { key: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("State '{key}' has schema version {found}, expected {expected}")]
    VersionMismatch { key: String, found: u32, expected: u32 },
}
