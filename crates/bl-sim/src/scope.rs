//! Simulated oscilloscope.
//!
//! Each configured channel carries a sine whose amplitude follows the
//! plant temperature. The screen is eight divisions tall, so one division
//! spans `(max_code + 1) / 8` codes around mid scale.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bl_acquire::{AcquireError, AcquireResult, SampleWidth, ScalingHeader, WaveformInstrument};
use bl_core::ChannelId;
use tracing::trace;

use crate::devices::FaultInjector;
use crate::plant::ThermalPlant;

const DIVISIONS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSpec {
    pub channel: ChannelId,
    /// Peak amplitude at the reference temperature (V).
    pub amplitude: f64,
    pub frequency_hz: f64,
    /// Relative amplitude change per kelvin.
    pub tempco: f64,
    pub reference_temperature: f64,
}

impl SignalSpec {
    pub fn new(channel: ChannelId, amplitude: f64) -> Self {
        Self {
            channel,
            amplitude,
            frequency_hz: 1e3,
            tempco: 0.0,
            reference_temperature: 22.0,
        }
    }

    fn amplitude_at(&self, temperature: Option<f64>) -> f64 {
        match temperature {
            Some(t) => self.amplitude * (1.0 + self.tempco * (t - self.reference_temperature)),
            None => self.amplitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeSimConfig {
    pub samples: usize,
    pub sample_interval_s: f64,
    /// Simulated time between arming and trigger completion.
    pub trigger_latency: Duration,
}

impl Default for ScopeSimConfig {
    fn default() -> Self {
        Self {
            samples: 500,
            sample_interval_s: 1e-5,
            trigger_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    width: Option<SampleWidth>,
    ranges: BTreeMap<ChannelId, f64>,
    captured: BTreeMap<ChannelId, (f64, Vec<u16>)>,
    triggers: u64,
    initializations: u64,
}

/// Test-side view of a [`SimScope`].
#[derive(Clone)]
pub struct ScopeHandle {
    state: Arc<Mutex<ScopeState>>,
    trigger_faults: FaultInjector,
    read_faults: FaultInjector,
}

impl ScopeHandle {
    fn state(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn triggers(&self) -> u64 {
        self.state().triggers
    }

    pub fn initializations(&self) -> u64 {
        self.state().initializations
    }

    pub fn range(&self, channel: ChannelId) -> Option<f64> {
        self.state().ranges.get(&channel).copied()
    }

    /// Time out the next `count` triggers.
    pub fn fail_triggers(&self, count: u32) {
        self.trigger_faults.fail_next(count);
    }

    /// Drop the link on the next `count` raw reads.
    pub fn fail_reads(&self, count: u32) {
        self.read_faults.fail_next(count);
    }
}

pub struct SimScope {
    config: ScopeSimConfig,
    signals: BTreeMap<ChannelId, SignalSpec>,
    plant: Option<ThermalPlant>,
    handle: ScopeHandle,
}

impl SimScope {
    pub fn new(config: ScopeSimConfig, signals: impl IntoIterator<Item = SignalSpec>) -> Self {
        Self {
            config,
            signals: signals.into_iter().map(|s| (s.channel, s)).collect(),
            plant: None,
            handle: ScopeHandle {
                state: Arc::new(Mutex::new(ScopeState::default())),
                trigger_faults: FaultInjector::new(),
                read_faults: FaultInjector::new(),
            },
        }
    }

    /// Make signal amplitudes follow the plant temperature.
    pub fn with_plant(mut self, plant: ThermalPlant) -> Self {
        self.plant = Some(plant);
        self
    }

    pub fn handle(&self) -> ScopeHandle {
        self.handle.clone()
    }

    fn codes_for(&self, spec: &SignalSpec, vpd: f64, width: SampleWidth, temp: Option<f64>) -> Vec<u16> {
        let per_div = (f64::from(width.max_code()) + 1.0) / DIVISIONS;
        let mid = f64::from(width.mid_code());
        let max = f64::from(width.max_code());
        let amplitude = spec.amplitude_at(temp);
        (0..self.config.samples)
            .map(|i| {
                let t = i as f64 * self.config.sample_interval_s;
                let v = amplitude * (std::f64::consts::TAU * spec.frequency_hz * t).sin();
                (mid + (v / vpd * per_div).round()).clamp(0.0, max) as u16
            })
            .collect()
    }

    fn width(&self) -> AcquireResult<SampleWidth> {
        self.handle
            .state()
            .width
            .ok_or_else(|| AcquireError::comm("scope not initialized"))
    }
}

impl WaveformInstrument for SimScope {
    fn initialize(&mut self, width: SampleWidth) -> AcquireResult<()> {
        let mut state = self.handle.state();
        state.width = Some(width);
        state.captured.clear();
        state.initializations += 1;
        Ok(())
    }

    fn set_range(&mut self, channel: ChannelId, volts_per_div: f64) -> AcquireResult<()> {
        if !self.signals.contains_key(&channel) {
            return Err(AcquireError::InvalidResponse {
                channel,
                message: "channel not present".to_string(),
            });
        }
        self.handle.state().ranges.insert(channel, volts_per_div);
        Ok(())
    }

    fn trigger_and_wait(&mut self, timeout: Duration) -> AcquireResult<()> {
        let width = self.width()?;
        if self.handle.trigger_faults.take() || self.config.trigger_latency > timeout {
            return Err(AcquireError::Timeout { timeout });
        }
        let temp = match &self.plant {
            Some(plant) => Some(plant.temperature().map_err(|e| AcquireError::comm(e.to_string()))?),
            None => None,
        };

        let ranges = self.handle.state().ranges.clone();
        let mut captured = BTreeMap::new();
        for (channel, spec) in &self.signals {
            if let Some(&vpd) = ranges.get(channel) {
                captured.insert(*channel, (vpd, self.codes_for(spec, vpd, width, temp)));
            }
        }

        let mut state = self.handle.state();
        state.captured = captured;
        state.triggers += 1;
        trace!(triggers = state.triggers, "sim scope triggered");
        Ok(())
    }

    fn read_raw(&mut self, channel: ChannelId) -> AcquireResult<Vec<u16>> {
        if self.handle.read_faults.take() {
            return Err(AcquireError::comm("injected link failure"));
        }
        self.handle
            .state()
            .captured
            .get(&channel)
            .map(|(_, codes)| codes.clone())
            .ok_or_else(|| AcquireError::InvalidResponse {
                channel,
                message: "no data captured".to_string(),
            })
    }

    fn scaling_header(&mut self, channel: ChannelId) -> AcquireResult<ScalingHeader> {
        let width = self.width()?;
        let state = self.handle.state();
        let (vpd, _) = state
            .captured
            .get(&channel)
            .ok_or_else(|| AcquireError::InvalidResponse {
                channel,
                message: "no data captured".to_string(),
            })?;
        Ok(ScalingHeader {
            t_step: self.config.sample_interval_s,
            t_origin: 0.0,
            t_ref: 0.0,
            v_step: vpd * DIVISIONS / (f64::from(width.max_code()) + 1.0),
            v_origin: 0.0,
            v_ref: f64::from(width.mid_code()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: ChannelId = ChannelId::new(1);

    #[test]
    fn requires_initialization() {
        let mut scope = SimScope::new(ScopeSimConfig::default(), [SignalSpec::new(CH, 0.1)]);
        assert!(scope.trigger_and_wait(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn codes_scale_with_range() {
        let mut scope = SimScope::new(
            ScopeSimConfig {
                samples: 4,
                sample_interval_s: 2.5e-4,
                ..ScopeSimConfig::default()
            },
            [SignalSpec::new(CH, 0.1)],
        );
        scope.initialize(SampleWidth::Byte).unwrap();
        scope.set_range(CH, 0.1).unwrap();
        scope.trigger_and_wait(Duration::from_secs(1)).unwrap();
        // quarter periods of a 1 kHz sine: 0, +peak, 0, -peak
        let codes = scope.read_raw(CH).unwrap();
        assert_eq!(codes, vec![128, 160, 128, 96]);

        let header = scope.scaling_header(CH).unwrap();
        assert!((header.voltage_of(160) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn injected_failures() {
        let mut scope = SimScope::new(ScopeSimConfig::default(), [SignalSpec::new(CH, 0.1)]);
        let handle = scope.handle();
        scope.initialize(SampleWidth::Byte).unwrap();
        scope.set_range(CH, 0.1).unwrap();

        handle.fail_triggers(1);
        assert!(matches!(
            scope.trigger_and_wait(Duration::from_secs(1)),
            Err(AcquireError::Timeout { .. })
        ));
        scope.trigger_and_wait(Duration::from_secs(1)).unwrap();
        handle.fail_reads(1);
        assert!(matches!(scope.read_raw(CH), Err(AcquireError::Comm { .. })));
        assert!(scope.read_raw(CH).is_ok());
        assert_eq!(handle.triggers(), 1);
    }

    #[test]
    fn slow_trigger_times_out() {
        let mut scope = SimScope::new(
            ScopeSimConfig {
                trigger_latency: Duration::from_secs(5),
                ..ScopeSimConfig::default()
            },
            [SignalSpec::new(CH, 0.1)],
        );
        scope.initialize(SampleWidth::Word).unwrap();
        assert!(matches!(
            scope.trigger_and_wait(Duration::from_secs(1)),
            Err(AcquireError::Timeout { .. })
        ));
    }
}
