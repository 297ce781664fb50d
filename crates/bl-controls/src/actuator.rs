//! Actuator seam for the regulator output.
//!
//! On the bench this is a programmable power supply driving a heater; the
//! regulator output is the supply voltage. [`GatedActuator`] adds the
//! write gate used for dry runs: while writes are disabled every command
//! is dropped and the hardware is never touched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ControlError, ControlResult, HardwareResult};

/// Supply-side measurement returned by actuators that can read back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorReadback {
    pub voltage: f64,
    pub current: f64,
}

/// Output device driven by the regulator.
pub trait Actuator: Send {
    /// Apply a new output value.
    fn write(&mut self, value: f64) -> HardwareResult<()>;

    /// Switch the output stage on or off.
    fn enable(&mut self, on: bool) -> HardwareResult<()>;

    /// Return the device to its power-on state.
    fn reset(&mut self) -> HardwareResult<()>;

    /// Measured output, if the device supports it.
    fn readback(&mut self) -> HardwareResult<Option<ActuatorReadback>> {
        Ok(None)
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn write(&mut self, value: f64) -> HardwareResult<()> {
        (**self).write(value)
    }

    fn enable(&mut self, on: bool) -> HardwareResult<()> {
        (**self).enable(on)
    }

    fn reset(&mut self) -> HardwareResult<()> {
        (**self).reset()
    }

    fn readback(&mut self) -> HardwareResult<Option<ActuatorReadback>> {
        (**self).readback()
    }
}

/// Actuator with a write gate.
pub struct GatedActuator {
    inner: Box<dyn Actuator>,
    writes_enabled: bool,
    last_written: Option<f64>,
    dropped: u64,
}

impl GatedActuator {
    pub fn new(inner: Box<dyn Actuator>, writes_enabled: bool) -> Self {
        if !writes_enabled {
            info!("actuator writes disabled, commands will be dropped");
        }
        Self {
            inner,
            writes_enabled,
            last_written: None,
            dropped: 0,
        }
    }

    pub fn writes_enabled(&self) -> bool {
        self.writes_enabled
    }

    pub fn set_writes_enabled(&mut self, enabled: bool) {
        self.writes_enabled = enabled;
    }

    /// Last value actually sent to the device.
    pub fn last_written(&self) -> Option<f64> {
        self.last_written
    }

    /// Number of commands dropped by the gate.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn write(&mut self, value: f64) -> ControlResult<()> {
        if !self.writes_enabled {
            self.dropped += 1;
            return Ok(());
        }
        self.inner.write(value).map_err(ControlError::Actuator)?;
        self.last_written = Some(value);
        Ok(())
    }

    /// Switch the output stage. Gated like writes.
    pub fn enable(&mut self, on: bool) -> ControlResult<()> {
        if !self.writes_enabled {
            debug!(on, "actuator enable dropped");
            return Ok(());
        }
        self.inner.enable(on).map_err(ControlError::Actuator)
    }

    pub fn reset(&mut self) -> ControlResult<()> {
        if !self.writes_enabled {
            return Ok(());
        }
        self.inner.reset().map_err(ControlError::Actuator)
    }

    /// Reads are never gated.
    pub fn readback(&mut self) -> ControlResult<Option<ActuatorReadback>> {
        self.inner.readback().map_err(ControlError::Actuator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        writes: Vec<f64>,
        enabled: Vec<bool>,
    }

    struct Recording(Arc<Mutex<Log>>);

    impl Actuator for Recording {
        fn write(&mut self, value: f64) -> HardwareResult<()> {
            self.0.lock().unwrap().writes.push(value);
            Ok(())
        }

        fn enable(&mut self, on: bool) -> HardwareResult<()> {
            self.0.lock().unwrap().enabled.push(on);
            Ok(())
        }

        fn reset(&mut self) -> HardwareResult<()> {
            Ok(())
        }

        fn readback(&mut self) -> HardwareResult<Option<ActuatorReadback>> {
            let v = self.0.lock().unwrap().writes.last().copied().unwrap_or(0.0);
            Ok(Some(ActuatorReadback {
                voltage: v,
                current: v / 10.0,
            }))
        }
    }

    #[test]
    fn enabled_gate_passes_commands() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut act = GatedActuator::new(Box::new(Recording(log.clone())), true);
        act.enable(true).unwrap();
        act.write(2.5).unwrap();
        assert_eq!(act.last_written(), Some(2.5));
        assert_eq!(log.lock().unwrap().writes, vec![2.5]);
        assert_eq!(log.lock().unwrap().enabled, vec![true]);
        assert_eq!(act.readback().unwrap().unwrap().voltage, 2.5);
    }

    #[test]
    fn disabled_gate_drops_silently() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut act = GatedActuator::new(Box::new(Recording(log.clone())), false);
        act.enable(true).unwrap();
        act.write(1.0).unwrap();
        act.write(2.0).unwrap();
        assert_eq!(act.dropped(), 2);
        assert_eq!(act.last_written(), None);
        assert!(log.lock().unwrap().writes.is_empty());
        assert!(log.lock().unwrap().enabled.is_empty());
    }
}
