//! Temperature regulation on top of [`PidRegulator`].
//!
//! The controller input is the retried sensor read and its output is the
//! gated actuator write. Stopping is supervised: above the ramp threshold
//! the target is walked down by `speed` every `interval` until the reading
//! falls to the threshold, and only then is the loop stopped and the
//! actuator switched off. A reading that never comes down ends the ramp
//! after `max_steps` decreases.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actuator::{ActuatorReadback, GatedActuator};
use crate::error::{ControlError, ControlResult};
use crate::measured::RetryingSensor;
use crate::regulator::{PidConfig, PidGuard, PidRegulator, RegulatorSnapshot};

/// Supervised ramp-down parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampConfig {
    /// Readings above this trigger a ramp on stop.
    pub threshold: f64,
    /// Target decrease per interval.
    pub speed: f64,
    /// Seconds between target decreases.
    pub interval_s: f64,
    /// Most target decreases before the ramp is abandoned.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_max_steps() -> u32 {
    720
}

impl RampConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if !self.threshold.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "ramp threshold must be finite",
            });
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "ramp speed must be positive",
            });
        }
        if !self.interval_s.is_finite()
            || self.interval_s <= 0.0
            || Duration::try_from_secs_f64(self.interval_s).is_err()
        {
            return Err(ControlError::InvalidArg {
                what: "ramp interval must be positive",
            });
        }
        if self.max_steps == 0 {
            return Err(ControlError::InvalidArg {
                what: "ramp max_steps must be at least 1",
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_s)
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            speed: 0.25,
            interval_s: 5.0,
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRegulatorConfig {
    pub pid: PidConfig,
    #[serde(default)]
    pub ramp: RampConfig,
}

/// What a supervised stop did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RampReport {
    /// Targets issued during the ramp, in order. The first entry is the
    /// hold at the reading observed when the stop began.
    pub targets: Vec<f64>,
    /// Last reading taken before the loop was stopped.
    pub final_reading: Option<f64>,
    /// The step limit ran out before the reading reached the threshold.
    pub capped: bool,
}

impl RampReport {
    pub fn ramped(&self) -> bool {
        self.targets.len() > 1
    }
}

/// Regulates a heater so the sensor follows the target temperature.
pub struct TemperatureRegulator {
    controller: PidRegulator,
    sensor: Arc<Mutex<RetryingSensor>>,
    actuator: Arc<Mutex<GatedActuator>>,
    ramp: RampConfig,
    engaged: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TemperatureRegulator {
    /// Build a stopped regulator holding the current temperature.
    ///
    /// The sensor is read once; that reading becomes the initial target.
    pub fn new(
        config: TemperatureRegulatorConfig,
        sensor: RetryingSensor,
        actuator: GatedActuator,
    ) -> ControlResult<Self> {
        config.ramp.validate()?;
        let sensor = Arc::new(Mutex::new(sensor));
        let actuator = Arc::new(Mutex::new(actuator));

        let initial_reading = lock(&sensor).read()?;

        let input_sensor = Arc::clone(&sensor);
        let output_actuator = Arc::clone(&actuator);
        let controller = PidRegulator::new(
            config.pid,
            0.0,
            initial_reading,
            Box::new(move || lock(&input_sensor).read()),
            Box::new(move |value| lock(&output_actuator).write(value)),
        )?;

        info!(initial_reading, "temperature regulator ready");
        Ok(Self {
            controller,
            sensor,
            actuator,
            ramp: config.ramp,
            engaged: false,
        })
    }

    /// Enable the actuator and start the control loop.
    pub fn start(&mut self) -> ControlResult<()> {
        if self.controller.is_running() {
            return Ok(());
        }
        lock(&self.actuator).enable(true)?;
        self.engaged = true;
        self.controller.start()
    }

    /// Supervised stop.
    ///
    /// Ramps the target down while the reading is above the threshold, then
    /// stops the loop and disables the actuator. The actuator is disabled
    /// even when the ramp ends on a sensor error; that error is returned
    /// afterwards. Calling this on a regulator that was never started (or
    /// was already stopped) does nothing.
    pub fn stop(&mut self) -> ControlResult<RampReport> {
        if !self.engaged {
            return Ok(RampReport::default());
        }
        self.engaged = false;

        let mut report = RampReport::default();
        let ramp_result = if self.controller.is_running() {
            self.ramp_down(&mut report)
        } else {
            Ok(())
        };

        self.controller.stop();
        let disable_result = {
            let _core = self.controller.lock();
            lock(&self.actuator).enable(false)
        };
        info!(final_reading = ?report.final_reading, "temperature regulator stopped");

        ramp_result?;
        disable_result?;
        Ok(report)
    }

    fn ramp_down(&self, report: &mut RampReport) -> ControlResult<()> {
        let mut reading = {
            let _core = self.controller.lock();
            lock(&self.sensor).read()?
        };
        report.final_reading = Some(reading);

        let mut target = self.controller.target().min(reading);
        self.controller.set_target(target);
        report.targets.push(target);

        if reading > self.ramp.threshold {
            warn!(
                reading,
                threshold = self.ramp.threshold,
                "temperature over threshold, ramping down before stop"
            );
        }

        while reading > self.ramp.threshold {
            if !self.controller.is_running() {
                warn!("controller stopped during ramp, abandoning ramp");
                break;
            }
            if report.targets.len() > self.ramp.max_steps as usize {
                warn!(
                    reading,
                    steps = self.ramp.max_steps,
                    "reading still over threshold after the last ramp step, disabling anyway"
                );
                report.capped = true;
                break;
            }
            target -= self.ramp.speed;
            self.controller.set_target(target);
            report.targets.push(target);
            info!(target, reading, "ramp step");

            thread::sleep(self.ramp.interval());

            reading = lock(&self.sensor).read()?;
            report.final_reading = Some(reading);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    pub fn set_target(&self, target: f64) {
        self.controller.set_target(target);
    }

    pub fn target(&self) -> f64 {
        self.controller.target()
    }

    pub fn output_value(&self) -> f64 {
        self.controller.output_value()
    }

    pub fn snapshot(&self) -> RegulatorSnapshot {
        self.controller.snapshot()
    }

    /// Read the sensor outside the controller lock.
    pub fn get_reading(&self) -> ControlResult<f64> {
        lock(&self.sensor).read()
    }

    /// Fault captured by the control thread, if it died on one.
    pub fn take_controller_fault(&self) -> Option<ControlError> {
        self.controller.take_fault()
    }

    /// Allow or drop actuator commands.
    pub fn set_writes_enabled(&self, enabled: bool) {
        lock(&self.actuator).set_writes_enabled(enabled);
    }

    /// Hold the controller lock so several quantities are read together.
    pub fn lock(&self) -> RegulatorGuard<'_> {
        RegulatorGuard {
            core: self.controller.lock(),
            sensor: &self.sensor,
            actuator: &self.actuator,
        }
    }
}

impl Drop for TemperatureRegulator {
    fn drop(&mut self) {
        if self.engaged
            && let Err(err) = self.stop()
        {
            warn!(error = %err, "temperature regulator stop on drop failed");
        }
    }
}

/// Consistent view of the regulator, the sensor and the supply.
pub struct RegulatorGuard<'a> {
    core: PidGuard<'a>,
    sensor: &'a Mutex<RetryingSensor>,
    actuator: &'a Mutex<GatedActuator>,
}

impl RegulatorGuard<'_> {
    pub fn target(&self) -> f64 {
        self.core.target()
    }

    pub fn output_value(&self) -> f64 {
        self.core.output_value()
    }

    pub fn read_temperature(&self) -> ControlResult<f64> {
        lock(self.sensor).read()
    }

    pub fn readback(&self) -> ControlResult<Option<ActuatorReadback>> {
        lock(self.actuator).readback()
    }
}
