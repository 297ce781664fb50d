//! Capture modes run once per iteration after the settling wait.

use bl_acquire::{AcquireError, AdaptiveAcquirer, CaptureOutcome};
use bl_controls::TemperatureRegulator;
use bl_core::ChannelId;
use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::record::{CaptureBin, ChannelAverage, ConditionReading, ExperimentState};

/// What a capture mode may use from the running bench.
pub struct CaptureContext<'a> {
    pub regulator: &'a TemperatureRegulator,
    /// Granularity of the bin key.
    pub key_resolution: f64,
}

pub trait CaptureMode: Send {
    fn name(&self) -> &'static str;

    fn capture(&mut self, ctx: &CaptureContext<'_>, state: &mut ExperimentState) -> AppResult<()>;
}

/// Read target, temperature, controller output and supply readback while
/// the control loop is held off.
pub fn read_conditions(regulator: &TemperatureRegulator) -> AppResult<ConditionReading> {
    let guard = regulator.lock();
    let temperature = guard.read_temperature()?;
    let readback = guard.readback()?;
    Ok(ConditionReading {
        time: Local::now().to_rfc3339(),
        target: guard.target(),
        temperature,
        output: guard.output_value(),
        supply_voltage: readback.as_ref().map(|r| r.voltage),
        supply_current: readback.as_ref().map(|r| r.current),
    })
}

/// Temperature rounded to the nearest multiple of `resolution`.
pub fn result_key(temperature: f64, resolution: f64) -> f64 {
    (temperature / resolution).round() * resolution
}

/// Records regulation readings only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionsCapture;

impl CaptureMode for ConditionsCapture {
    fn name(&self) -> &'static str {
        "Conditions"
    }

    fn capture(&mut self, ctx: &CaptureContext<'_>, state: &mut ExperimentState) -> AppResult<()> {
        let reading = read_conditions(ctx.regulator)?;
        debug!(temperature = reading.temperature, "conditions recorded");
        state.conditions.push(reading);
        state.mark_captured();
        Ok(())
    }
}

struct ChannelSum {
    channel: ChannelId,
    count: u32,
    clipped_count: u32,
    range_indices: Vec<usize>,
    times: Vec<f64>,
    sums: Vec<f64>,
}

struct BinAccumulator {
    key: f64,
    count: u32,
    temperature_sum: f64,
    channels: Vec<ChannelSum>,
}

impl BinAccumulator {
    fn new(key: f64) -> Self {
        Self {
            key,
            count: 0,
            temperature_sum: 0.0,
            channels: Vec::new(),
        }
    }

    fn add(&mut self, temperature: f64, outcome: CaptureOutcome) {
        self.count += 1;
        self.temperature_sum += temperature;
        for waveform in outcome.waveforms {
            let voltages: Vec<f64> = waveform.voltages().collect();
            match self.channels.iter_mut().find(|c| c.channel == waveform.channel) {
                Some(sum) => {
                    // Record lengths can differ between captures; keep the
                    // common prefix.
                    let len = sum.sums.len().min(voltages.len());
                    sum.sums.truncate(len);
                    sum.times.truncate(len);
                    for (acc, v) in sum.sums.iter_mut().zip(&voltages) {
                        *acc += v;
                    }
                    sum.count += 1;
                    sum.clipped_count += u32::from(waveform.clipped);
                    sum.range_indices.push(waveform.range_index);
                }
                None => self.channels.push(ChannelSum {
                    channel: waveform.channel,
                    count: 1,
                    clipped_count: u32::from(waveform.clipped),
                    range_indices: vec![waveform.range_index],
                    times: waveform.samples.iter().map(|s| s.time).collect(),
                    sums: voltages,
                }),
            }
        }
    }

    fn finish(self) -> CaptureBin {
        let count = self.count.max(1);
        CaptureBin {
            key: self.key,
            count: self.count,
            mean_temperature: self.temperature_sum / f64::from(count),
            channels: self
                .channels
                .into_iter()
                .map(|c| {
                    let n = f64::from(c.count);
                    ChannelAverage {
                        channel: c.channel,
                        count: c.count,
                        clipped_count: c.clipped_count,
                        range_indices: c.range_indices,
                        times: c.times,
                        voltages: c.sums.into_iter().map(|s| s / n).collect(),
                    }
                })
                .collect(),
        }
    }
}

/// Adaptive oscilloscope capture with binning, averaging and retry.
pub struct ScopeCapture {
    acquirer: AdaptiveAcquirer,
    channels: Vec<ChannelId>,
    captures_per_loop: u32,
    fail_threshold: u32,
}

impl ScopeCapture {
    pub fn new(
        acquirer: AdaptiveAcquirer,
        channels: Vec<ChannelId>,
        captures_per_loop: u32,
        fail_threshold: u32,
    ) -> Self {
        Self {
            acquirer,
            channels,
            captures_per_loop: captures_per_loop.max(1),
            fail_threshold,
        }
    }

    pub fn acquirer(&self) -> &AdaptiveAcquirer {
        &self.acquirer
    }

    fn acquire(&mut self) -> Result<CaptureOutcome, AcquireError> {
        if !self.acquirer.is_ready() {
            self.acquirer.initialize()?;
        }
        self.acquirer.capture(&self.channels)
    }
}

impl CaptureMode for ScopeCapture {
    fn name(&self) -> &'static str {
        "Scope"
    }

    fn capture(&mut self, ctx: &CaptureContext<'_>, state: &mut ExperimentState) -> AppResult<()> {
        let mut bins: Vec<BinAccumulator> = Vec::new();
        let mut failures = 0u32;

        for n in 0..self.captures_per_loop {
            loop {
                let reading = read_conditions(ctx.regulator)?;
                let outcome = match self.acquire() {
                    Ok(outcome) => outcome,
                    Err(err @ AcquireError::InvalidConfig { .. }) => return Err(err.into()),
                    Err(err) => {
                        failures += 1;
                        state.capture_failures = failures;
                        warn!(
                            error = %err,
                            failures,
                            threshold = self.fail_threshold,
                            "capture attempt failed"
                        );
                        if failures > self.fail_threshold {
                            return Err(AppError::CaptureFailureLimitExceeded {
                                failures,
                                threshold: self.fail_threshold,
                                last: err,
                            });
                        }
                        if let Err(reinit) = self.acquirer.reinitialize() {
                            warn!(error = %reinit, "reinitialization failed, retrying anyway");
                        }
                        continue;
                    }
                };

                let key = result_key(reading.temperature, ctx.key_resolution);
                let index = match bins.iter().position(|b| b.key == key) {
                    Some(index) => index,
                    None => {
                        bins.push(BinAccumulator::new(key));
                        bins.len() - 1
                    }
                };
                debug!(capture = n, key, rounds = outcome.rounds, "capture accepted");
                bins[index].add(reading.temperature, outcome);
                state.conditions.push(reading);
                break;
            }
        }

        state.bins = bins.into_iter().map(BinAccumulator::finish).collect();
        state.mark_captured();
        info!(
            bins = state.bins.len(),
            captures = self.captures_per_loop,
            failures,
            "scope capture complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rounds_to_resolution() {
        assert_eq!(result_key(29.74, 0.5), 29.5);
        assert_eq!(result_key(29.76, 0.5), 30.0);
        assert_eq!(result_key(-1.2, 1.0), -1.0);
    }
}
