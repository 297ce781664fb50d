//! Lumped thermal plant: a resistive heater coupled to a sample.
//!
//! Two nodes, heater and sample:
//!
//! ```text
//! C_h dT_h/dt = V^2/R - G_c (T_h - T_s)
//! C_s dT_s/dt = G_c (T_h - T_s) - G_l (T_s - T_amb)
//! ```
//!
//! The plant is shared between the simulated thermometer, supply and scope
//! through a cloneable [`ThermalPlant`] handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::integrator::{OdeModel, rk4_step};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantConfig {
    /// Ambient temperature (°C).
    pub ambient: f64,
    /// Starting temperature of both nodes (°C).
    pub initial: f64,
    /// Heater resistance (Ω).
    pub heater_resistance: f64,
    /// Heater heat capacity (J/K).
    pub heater_capacity: f64,
    /// Sample heat capacity (J/K).
    pub sample_capacity: f64,
    /// Heater to sample conductance (W/K).
    pub coupling: f64,
    /// Sample to ambient conductance (W/K).
    pub loss: f64,
    /// Largest integration step in simulated seconds.
    pub max_step: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            ambient: 22.0,
            initial: 22.0,
            heater_resistance: 4.0,
            heater_capacity: 20.0,
            sample_capacity: 100.0,
            coupling: 5.0,
            loss: 0.5,
            max_step: 0.5,
        }
    }
}

impl PlantConfig {
    pub fn validate(&self) -> SimResult<()> {
        let positive = [
            (self.heater_resistance, "heater resistance must be positive"),
            (self.heater_capacity, "heater capacity must be positive"),
            (self.sample_capacity, "sample capacity must be positive"),
            (self.coupling, "coupling must be positive"),
            (self.max_step, "max step must be positive"),
        ];
        for (value, what) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimError::InvalidArg { what });
            }
        }
        if !self.loss.is_finite() || self.loss < 0.0 {
            return Err(SimError::InvalidArg {
                what: "loss must be non-negative",
            });
        }
        if !self.ambient.is_finite() || !self.initial.is_finite() {
            return Err(SimError::InvalidArg {
                what: "temperatures must be finite",
            });
        }
        Ok(())
    }
}

/// How simulated time advances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimClock {
    /// Follow the wall clock, `time_scale` simulated seconds per second.
    Wall { time_scale: f64 },
    /// Only [`ThermalPlant::advance`] moves time.
    Manual,
    /// Every thermometer read advances `per_read_s` simulated seconds.
    PerRead { per_read_s: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantState {
    pub heater: f64,
    pub sample: f64,
}

struct HeaterModel {
    config: PlantConfig,
    power: f64,
}

impl OdeModel for HeaterModel {
    type State = PlantState;

    fn derivative(&self, _t: f64, x: &PlantState) -> SimResult<PlantState> {
        if !x.heater.is_finite() || !x.sample.is_finite() {
            return Err(SimError::NonPhysical {
                what: "plant temperature diverged",
            });
        }
        let c = &self.config;
        let to_sample = c.coupling * (x.heater - x.sample);
        let to_ambient = c.loss * (x.sample - c.ambient);
        Ok(PlantState {
            heater: (self.power - to_sample) / c.heater_capacity,
            sample: (to_sample - to_ambient) / c.sample_capacity,
        })
    }

    fn axpy(&self, a: &PlantState, k: f64, b: &PlantState) -> PlantState {
        PlantState {
            heater: a.heater + k * b.heater,
            sample: a.sample + k * b.sample,
        }
    }
}

struct PlantCore {
    config: PlantConfig,
    clock: SimClock,
    state: PlantState,
    time: f64,
    last_sync: Instant,
    voltage: f64,
    enabled: bool,
}

impl PlantCore {
    fn power(&self) -> f64 {
        if self.enabled {
            self.voltage * self.voltage / self.config.heater_resistance
        } else {
            0.0
        }
    }

    fn integrate(&mut self, duration: f64) -> SimResult<()> {
        if duration <= 0.0 {
            return Ok(());
        }
        let model = HeaterModel {
            config: self.config,
            power: self.power(),
        };
        let steps = (duration / self.config.max_step).ceil().max(1.0) as u64;
        let dt = duration / steps as f64;
        for _ in 0..steps {
            self.state = rk4_step(&model, self.time, &self.state, dt)?;
            self.time += dt;
        }
        trace!(time = self.time, sample = self.state.sample, "plant advanced");
        Ok(())
    }

    fn sync_wall(&mut self) -> SimResult<()> {
        if let SimClock::Wall { time_scale } = self.clock {
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_sync).as_secs_f64();
            self.last_sync = now;
            self.integrate(elapsed * time_scale)?;
        }
        Ok(())
    }
}

/// Shared handle on the simulated plant.
#[derive(Clone)]
pub struct ThermalPlant {
    core: Arc<Mutex<PlantCore>>,
}

impl ThermalPlant {
    pub fn new(config: PlantConfig, clock: SimClock) -> SimResult<Self> {
        config.validate()?;
        match clock {
            SimClock::Wall { time_scale } if !(time_scale.is_finite() && time_scale > 0.0) => {
                return Err(SimError::InvalidArg {
                    what: "time scale must be positive",
                });
            }
            SimClock::PerRead { per_read_s } if !(per_read_s.is_finite() && per_read_s >= 0.0) => {
                return Err(SimError::InvalidArg {
                    what: "per-read step must be non-negative",
                });
            }
            _ => {}
        }
        Ok(Self {
            core: Arc::new(Mutex::new(PlantCore {
                config,
                clock,
                state: PlantState {
                    heater: config.initial,
                    sample: config.initial,
                },
                time: 0.0,
                last_sync: Instant::now(),
                voltage: 0.0,
                enabled: false,
            })),
        })
    }

    fn core(&self) -> MutexGuard<'_, PlantCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the plant up to date and return the sample temperature.
    pub fn temperature(&self) -> SimResult<f64> {
        let mut core = self.core();
        core.sync_wall()?;
        Ok(core.state.sample)
    }

    /// Sample temperature as read by the thermometer, applying the
    /// per-read clock step first.
    pub(crate) fn read_sensor(&self) -> SimResult<f64> {
        let mut core = self.core();
        core.sync_wall()?;
        if let SimClock::PerRead { per_read_s } = core.clock {
            core.integrate(per_read_s)?;
        }
        Ok(core.state.sample)
    }

    pub fn state(&self) -> SimResult<PlantState> {
        let mut core = self.core();
        core.sync_wall()?;
        Ok(core.state)
    }

    /// Advance simulated time by `seconds` regardless of the clock mode.
    pub fn advance(&self, seconds: f64) -> SimResult<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(SimError::InvalidArg {
                what: "advance must be non-negative",
            });
        }
        let mut core = self.core();
        core.sync_wall()?;
        core.integrate(seconds)
    }

    /// Simulated seconds since creation.
    pub fn time(&self) -> f64 {
        self.core().time
    }

    /// Force the sample temperature, e.g. to start a test hot.
    pub fn set_temperature(&self, value: f64) {
        let mut core = self.core();
        core.state = PlantState {
            heater: value,
            sample: value,
        };
    }

    pub(crate) fn set_voltage(&self, voltage: f64) -> SimResult<()> {
        let mut core = self.core();
        core.sync_wall()?;
        core.voltage = voltage;
        Ok(())
    }

    pub(crate) fn set_enabled(&self, enabled: bool) -> SimResult<()> {
        let mut core = self.core();
        core.sync_wall()?;
        core.enabled = enabled;
        Ok(())
    }

    pub fn voltage(&self) -> f64 {
        self.core().voltage
    }

    pub fn enabled(&self) -> bool {
        self.core().enabled
    }

    /// Heater current at the programmed voltage (zero when disabled).
    pub fn current(&self) -> f64 {
        let core = self.core();
        if core.enabled {
            core.voltage / core.config.heater_resistance
        } else {
            0.0
        }
    }

    /// Sample temperature reached at steady state for `voltage`.
    pub fn steady_state(&self, voltage: f64) -> f64 {
        let c = self.core().config;
        let power = voltage * voltage / c.heater_resistance;
        if c.loss == 0.0 {
            f64::INFINITY
        } else {
            c.ambient + power / c.loss
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> ThermalPlant {
        ThermalPlant::new(PlantConfig::default(), SimClock::Manual).unwrap()
    }

    #[test]
    fn idle_plant_stays_at_ambient() {
        let plant = manual();
        plant.advance(1000.0).unwrap();
        assert!((plant.temperature().unwrap() - 22.0).abs() < 1e-9);
    }

    #[test]
    fn heater_approaches_steady_state() {
        let plant = manual();
        plant.set_voltage(4.0).unwrap();
        plant.set_enabled(true).unwrap();
        // 4 W into 0.5 W/K: +8 K
        let target = plant.steady_state(4.0);
        assert!((target - 30.0).abs() < 1e-12);
        plant.advance(5000.0).unwrap();
        assert!((plant.temperature().unwrap() - target).abs() < 0.05);
        assert!((plant.current() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hot_plant_cools_when_disabled() {
        let plant = manual();
        plant.set_temperature(80.0);
        plant.advance(60.0).unwrap();
        let t = plant.temperature().unwrap();
        assert!(t < 80.0 && t > 22.0);
    }

    #[test]
    fn per_read_clock_advances_on_sensor_reads() {
        let plant =
            ThermalPlant::new(PlantConfig::default(), SimClock::PerRead { per_read_s: 2.0 }).unwrap();
        plant.read_sensor().unwrap();
        plant.read_sensor().unwrap();
        assert!((plant.time() - 4.0).abs() < 1e-12);
        plant.temperature().unwrap();
        assert!((plant.time() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = PlantConfig {
            heater_resistance: 0.0,
            ..PlantConfig::default()
        };
        assert!(ThermalPlant::new(config, SimClock::Manual).is_err());
        assert!(
            ThermalPlant::new(PlantConfig::default(), SimClock::Wall { time_scale: 0.0 }).is_err()
        );
    }
}
