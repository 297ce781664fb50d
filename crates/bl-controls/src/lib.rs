//! Closed-loop regulation for the bench.
//!
//! - [`controller`]: the discrete PID law and its state
//! - [`regulator`]: the threaded loop around it, with fault capture
//! - [`temperature`]: sensor/actuator binding and supervised ramp-down
//! - [`measured`] and [`actuator`]: the hardware seams
//!
//! Nothing here knows about instruments, experiments or persistence.

pub mod actuator;
pub mod controller;
pub mod error;
pub mod measured;
pub mod regulator;
pub mod sampled;
pub mod temperature;

pub use actuator::{Actuator, ActuatorReadback, GatedActuator};
pub use controller::{PidGains, PidState, PidStep};
pub use error::{ControlError, ControlResult, HardwareError, HardwareResult};
pub use measured::{RetryingSensor, Sensor};
pub use regulator::{InputFn, OutputFn, PidConfig, PidGuard, PidRegulator, RegulatorSnapshot};
pub use sampled::SamplePeriod;
pub use temperature::{
    RampConfig, RampReport, RegulatorGuard, TemperatureRegulator, TemperatureRegulatorConfig,
};
