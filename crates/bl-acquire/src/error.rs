//! Acquisition errors.

use std::time::Duration;

use bl_core::ChannelId;
use thiserror::Error;

pub type AcquireResult<T> = Result<T, AcquireError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcquireError {
    /// Trigger did not complete in time. No data is returned.
    #[error("Trigger timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Link to the instrument failed mid-acquisition.
    #[error("Instrument communication error: {message}")]
    Comm { message: String },

    /// The instrument answered with unusable data.
    #[error("Invalid response for {channel}: {message}")]
    InvalidResponse { channel: ChannelId, message: String },

    #[error("Instrument has not been initialized for adaptive capture")]
    NotInitialized,

    #[error("Invalid acquisition config: {what}")]
    InvalidConfig { what: String },
}

impl AcquireError {
    pub fn comm(message: impl Into<String>) -> Self {
        Self::Comm {
            message: message.into(),
        }
    }

    pub fn invalid_config(what: impl Into<String>) -> Self {
        Self::InvalidConfig { what: what.into() }
    }
}
