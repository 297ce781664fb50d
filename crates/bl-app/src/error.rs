//! Error types for the bench application layer.

use bl_acquire::AcquireError;
use bl_controls::ControlError;

/// Application error wrapping the lower crates plus the run-level failures
/// only the orchestrator decides on.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] bl_config::ConfigError),

    #[error("Regulator error: {0}")]
    Control(#[from] ControlError),

    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Persistence error: {0}")]
    Results(#[from] bl_results::ResultsError),

    #[error("Simulation error: {0}")]
    Simulation(String),

    /// The control thread died; its captured fault.
    #[error("Controller fault: {0}")]
    ControllerFault(ControlError),

    /// The control thread is gone but left no fault behind.
    #[error("Regulator is not running")]
    RegulatorStopped,

    #[error("Capture failed {failures} time(s), threshold {threshold}: {last}")]
    CaptureFailureLimitExceeded {
        failures: u32,
        threshold: u32,
        last: AcquireError,
    },

    #[error("Post-processor {name} aborted the iteration: {reason}")]
    PostProcess { name: &'static str, reason: String },

    #[error("Interrupted by operator")]
    Interrupted,

    #[error("Stop requested")]
    StopRequested,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bl-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<bl_sim::SimError> for AppError {
    fn from(err: bl_sim::SimError) -> Self {
        AppError::Simulation(err.to_string())
    }
}

impl From<bl_config::ValidationError> for AppError {
    fn from(err: bl_config::ValidationError) -> Self {
        AppError::Config(err.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Results(err.into())
    }
}
