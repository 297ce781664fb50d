//! Sampling period for the discrete controller.
//!
//! The regulator executes once per period and sleeps for whatever part of
//! the period is left after the step. Pacing is best effort: a step that
//! overruns its period is followed immediately by the next one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Validated controller sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SamplePeriod {
    secs: f64,
}

impl SamplePeriod {
    /// Create a period of `secs` seconds.
    ///
    /// # Errors
    ///
    /// Returns an error unless `secs` is finite and positive.
    pub fn new(secs: f64) -> ControlResult<Self> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "sample period must be finite and positive",
            });
        }
        Ok(Self { secs })
    }

    pub fn from_duration(period: Duration) -> ControlResult<Self> {
        Self::new(period.as_secs_f64())
    }

    /// Create a period from a frequency in Hz.
    pub fn from_frequency(freq_hz: f64) -> ControlResult<Self> {
        if !freq_hz.is_finite() || freq_hz <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "frequency must be finite and positive",
            });
        }
        Self::new(1.0 / freq_hz)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.secs)
    }

    /// Ratio `self / previous`, used to rescale period-dependent gains.
    pub fn ratio_to(&self, previous: SamplePeriod) -> f64 {
        self.secs / previous.secs
    }

    /// Sleep time left in this period after `elapsed` of processing.
    ///
    /// Returns `None` when the step used the whole period (or more).
    pub fn remaining_after(&self, elapsed: Duration) -> Option<Duration> {
        self.as_duration()
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }
}

impl TryFrom<f64> for SamplePeriod {
    type Error = ControlError;

    fn try_from(secs: f64) -> Result<Self, Self::Error> {
        Self::new(secs)
    }
}

impl From<SamplePeriod> for f64 {
    fn from(period: SamplePeriod) -> f64 {
        period.secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_validation() {
        assert!(SamplePeriod::new(0.5).is_ok());
        assert!(SamplePeriod::new(0.0).is_err());
        assert!(SamplePeriod::new(-1.0).is_err());
        assert!(SamplePeriod::new(f64::NAN).is_err());
    }

    #[test]
    fn period_from_frequency() {
        let period = SamplePeriod::from_frequency(10.0).unwrap();
        assert!((period.as_secs_f64() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn ratio_between_periods() {
        let old = SamplePeriod::new(2.0).unwrap();
        let new = SamplePeriod::new(0.5).unwrap();
        assert!((new.ratio_to(old) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn remaining_time_in_period() {
        let period = SamplePeriod::new(1.0).unwrap();
        assert_eq!(
            period.remaining_after(Duration::from_millis(250)),
            Some(Duration::from_millis(750))
        );
        assert_eq!(period.remaining_after(Duration::from_secs(1)), None);
        assert_eq!(period.remaining_after(Duration::from_secs(3)), None);
    }
}
