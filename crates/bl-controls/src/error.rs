//! Error types for regulation and hardware I/O.

use bl_core::CoreError;
use thiserror::Error;

/// Result type for control system operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Result type for raw sensor/actuator operations.
pub type HardwareResult<T> = Result<T, HardwareError>;

/// Failure reported by a sensor or actuator driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HardwareError {
    /// The device did not answer or the link dropped.
    #[error("Communication error on {device}: {message}")]
    Comm { device: String, message: String },

    /// The device answered with something that could not be parsed.
    #[error("Invalid response from {device}: {message}")]
    InvalidResponse { device: String, message: String },

    /// The device did not respond in time.
    #[error("Timed out waiting for {device}")]
    Timeout { device: String },
}

/// Errors that can occur in control system operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Sensor kept failing after every retry.
    #[error("Sensor read failed after {attempts} attempt(s): {source}")]
    SensorExhausted {
        attempts: u32,
        #[source]
        source: HardwareError,
    },

    /// Actuator rejected a command.
    #[error("Actuator error: {0}")]
    Actuator(#[source] HardwareError),

    /// A sensor or actuator callback panicked inside the control step.
    #[error("Control step panicked: {message}")]
    Panic { message: String },

    /// The control thread could not be spawned.
    #[error("Failed to spawn control thread: {message}")]
    Spawn { message: String },
}
