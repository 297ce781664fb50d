//! Measured process variable.
//!
//! A [`Sensor`] is whatever returns the regulated quantity (thermometer,
//! thermocouple reader, simulated plant). Reads may fail transiently;
//! [`RetryingSensor`] bounds the retries and escalates the last failure.

use bl_core::ChannelId;
use tracing::{debug, warn};

use crate::error::{ControlError, ControlResult, HardwareError, HardwareResult};

/// Source of the regulated measurement.
pub trait Sensor: Send {
    /// Read the value on `channel`.
    fn read(&mut self, channel: ChannelId) -> HardwareResult<f64>;
}

impl<S: Sensor + ?Sized> Sensor for Box<S> {
    fn read(&mut self, channel: ChannelId) -> HardwareResult<f64> {
        (**self).read(channel)
    }
}

/// Sensor read with a bounded attempt count.
pub struct RetryingSensor {
    inner: Box<dyn Sensor>,
    channel: ChannelId,
    attempts: u32,
    last: Option<f64>,
}

impl RetryingSensor {
    /// # Errors
    ///
    /// `attempts` must be at least one.
    pub fn new(inner: Box<dyn Sensor>, channel: ChannelId, attempts: u32) -> ControlResult<Self> {
        if attempts == 0 {
            return Err(ControlError::InvalidArg {
                what: "sensor read attempts must be at least 1",
            });
        }
        Ok(Self {
            inner,
            channel,
            attempts,
            last: None,
        })
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Last successfully read value.
    pub fn last_value(&self) -> Option<f64> {
        self.last
    }

    /// Read, retrying up to the configured attempt count.
    ///
    /// Non-finite values count as failed attempts.
    pub fn read(&mut self) -> ControlResult<f64> {
        let mut last_err = None;
        for attempt in 1..=self.attempts {
            match self.inner.read(self.channel) {
                Ok(value) if value.is_finite() => {
                    if attempt > 1 {
                        debug!(channel = %self.channel, attempt, "sensor read recovered");
                    }
                    self.last = Some(value);
                    return Ok(value);
                }
                Ok(value) => {
                    warn!(channel = %self.channel, attempt, value, "sensor returned non-finite value");
                    last_err = Some(HardwareError::InvalidResponse {
                        device: "sensor".to_string(),
                        message: format!("non-finite reading {value}"),
                    });
                }
                Err(err) => {
                    warn!(channel = %self.channel, attempt, error = %err, "sensor read failed");
                    last_err = Some(err);
                }
            }
        }
        Err(ControlError::SensorExhausted {
            attempts: self.attempts,
            source: last_err.unwrap_or(HardwareError::Timeout {
                device: "sensor".to_string(),
            }),
        })
    }
}
