//! Simulated bench hardware.
//!
//! - [`plant`]: two-node heater/sample thermal model
//! - [`devices`]: thermometer and supply bound to the plant
//! - [`scope`]: waveform instrument whose signal follows the plant
//!
//! Every device exposes a fault injector so the retry and shutdown paths
//! can be exercised without hardware.

pub mod devices;
pub mod error;
pub mod integrator;
pub mod plant;
pub mod scope;

pub use devices::{FaultInjector, SimSupply, SimThermometer};
pub use error::{SimError, SimResult};
pub use integrator::{OdeModel, rk4_step};
pub use plant::{PlantConfig, PlantState, SimClock, ThermalPlant};
pub use scope::{ScopeHandle, ScopeSimConfig, SignalSpec, SimScope};
