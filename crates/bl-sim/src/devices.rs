//! Simulated thermometer and heater supply.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bl_controls::{Actuator, ActuatorReadback, HardwareError, HardwareResult, Sensor};
use bl_core::ChannelId;
use tracing::debug;

use crate::plant::ThermalPlant;

/// Shared countdown of injected failures.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    pending: Arc<AtomicU32>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail.
    pub fn fail_next(&self, count: u32) {
        self.pending.store(count, Ordering::Release);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume one pending failure, if any.
    pub fn take(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Thermometer reading the plant's sample node.
pub struct SimThermometer {
    plant: ThermalPlant,
    channel: ChannelId,
    faults: FaultInjector,
}

impl SimThermometer {
    pub fn new(plant: ThermalPlant, channel: ChannelId) -> Self {
        Self {
            plant,
            channel,
            faults: FaultInjector::new(),
        }
    }

    pub fn faults(&self) -> FaultInjector {
        self.faults.clone()
    }
}

impl Sensor for SimThermometer {
    fn read(&mut self, channel: ChannelId) -> HardwareResult<f64> {
        if channel != self.channel {
            return Err(HardwareError::InvalidResponse {
                device: "sim-thermometer".to_string(),
                message: format!("no probe on {channel}"),
            });
        }
        if self.faults.take() {
            return Err(HardwareError::Comm {
                device: "sim-thermometer".to_string(),
                message: "injected read failure".to_string(),
            });
        }
        self.plant.read_sensor().map_err(|err| HardwareError::InvalidResponse {
            device: "sim-thermometer".to_string(),
            message: err.to_string(),
        })
    }
}

/// Programmable supply driving the plant heater.
pub struct SimSupply {
    plant: ThermalPlant,
    max_voltage: f64,
    faults: FaultInjector,
}

impl SimSupply {
    pub fn new(plant: ThermalPlant, max_voltage: f64) -> Self {
        Self {
            plant,
            max_voltage,
            faults: FaultInjector::new(),
        }
    }

    pub fn faults(&self) -> FaultInjector {
        self.faults.clone()
    }

    fn device_error(err: impl ToString) -> HardwareError {
        HardwareError::InvalidResponse {
            device: "sim-supply".to_string(),
            message: err.to_string(),
        }
    }
}

impl Actuator for SimSupply {
    fn write(&mut self, value: f64) -> HardwareResult<()> {
        if self.faults.take() {
            return Err(HardwareError::Comm {
                device: "sim-supply".to_string(),
                message: "injected write failure".to_string(),
            });
        }
        if !value.is_finite() {
            return Err(Self::device_error(format!("rejected voltage {value}")));
        }
        self.plant
            .set_voltage(value.clamp(0.0, self.max_voltage))
            .map_err(Self::device_error)
    }

    fn enable(&mut self, on: bool) -> HardwareResult<()> {
        debug!(on, "sim supply output");
        self.plant.set_enabled(on).map_err(Self::device_error)
    }

    fn reset(&mut self) -> HardwareResult<()> {
        self.plant.set_voltage(0.0).map_err(Self::device_error)?;
        self.plant.set_enabled(false).map_err(Self::device_error)
    }

    fn readback(&mut self) -> HardwareResult<Option<ActuatorReadback>> {
        let voltage = if self.plant.enabled() {
            self.plant.voltage()
        } else {
            0.0
        };
        Ok(Some(ActuatorReadback {
            voltage,
            current: self.plant.current(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::{PlantConfig, SimClock};

    fn plant() -> ThermalPlant {
        ThermalPlant::new(PlantConfig::default(), SimClock::Manual).unwrap()
    }

    #[test]
    fn injected_faults_are_consumed() {
        let faults = FaultInjector::new();
        faults.fail_next(2);
        assert!(faults.take());
        assert!(faults.take());
        assert!(!faults.take());
        assert_eq!(faults.pending(), 0);
    }

    #[test]
    fn thermometer_reads_plant() {
        let plant = plant();
        let mut probe = SimThermometer::new(plant.clone(), ChannelId::new(3));
        assert_eq!(probe.read(ChannelId::new(3)).unwrap(), 22.0);
        assert!(probe.read(ChannelId::new(1)).is_err());

        probe.faults().fail_next(1);
        assert!(matches!(
            probe.read(ChannelId::new(3)),
            Err(HardwareError::Comm { .. })
        ));
        assert!(probe.read(ChannelId::new(3)).is_ok());
    }

    #[test]
    fn supply_clamps_and_reads_back() {
        let plant = plant();
        let mut supply = SimSupply::new(plant.clone(), 10.0);
        supply.write(25.0).unwrap();
        assert_eq!(plant.voltage(), 10.0);
        assert_eq!(supply.readback().unwrap().unwrap().voltage, 0.0);

        supply.enable(true).unwrap();
        let rb = supply.readback().unwrap().unwrap();
        assert_eq!(rb.voltage, 10.0);
        assert!((rb.current - 2.5).abs() < 1e-12);

        supply.reset().unwrap();
        assert!(!plant.enabled());
        assert_eq!(plant.voltage(), 0.0);
        assert!(supply.write(f64::NAN).is_err());
    }
}
