//! Post-processors applied to each finished record, in configured order.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::record::ExperimentState;

pub trait PostProcessor: Send {
    fn name(&self) -> &'static str;

    /// Transform the record. An error aborts the iteration.
    fn process(&mut self, state: ExperimentState) -> AppResult<ExperimentState>;
}

/// Run `state` through every processor in order.
pub fn run_chain(
    chain: &mut [Box<dyn PostProcessor>],
    mut state: ExperimentState,
) -> AppResult<ExperimentState> {
    for processor in chain.iter_mut() {
        debug!(processor = processor.name(), "post-processing");
        state = processor.process(state)?;
    }
    Ok(state)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub key: f64,
    pub channel: u32,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
    pub peak_to_peak: f64,
}

impl ChannelStats {
    fn of(key: f64, channel: u32, voltages: &[f64]) -> Option<Self> {
        if voltages.is_empty() {
            return None;
        }
        let n = voltages.len() as f64;
        let min = voltages.iter().copied().fold(f64::INFINITY, f64::min);
        let max = voltages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = voltages.iter().sum::<f64>() / n;
        let rms = (voltages.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
        Some(Self {
            key,
            channel,
            min,
            max,
            mean,
            rms,
            peak_to_peak: max - min,
        })
    }
}

/// Summary statistics of every averaged channel, under `waveform_stats`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaveformStats;

impl PostProcessor for WaveformStats {
    fn name(&self) -> &'static str {
        "WaveformStats"
    }

    fn process(&mut self, mut state: ExperimentState) -> AppResult<ExperimentState> {
        let stats: Vec<ChannelStats> = state
            .bins
            .iter()
            .flat_map(|bin| {
                bin.channels
                    .iter()
                    .filter_map(move |c| ChannelStats::of(bin.key, c.channel.number(), &c.voltages))
            })
            .collect();
        state.annotate("waveform_stats", serde_json::to_value(stats)?);
        Ok(state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipFinding {
    pub key: f64,
    pub channel: u32,
    pub clipped: u32,
    pub captures: u32,
}

/// Reports channels accepted while clipping at the widest range, under
/// `clip_audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClipAudit {
    pub abort_on_clip: bool,
}

impl PostProcessor for ClipAudit {
    fn name(&self) -> &'static str {
        "ClipAudit"
    }

    fn process(&mut self, mut state: ExperimentState) -> AppResult<ExperimentState> {
        let findings: Vec<ClipFinding> = state
            .bins
            .iter()
            .flat_map(|bin| {
                bin.channels
                    .iter()
                    .filter(|c| c.clipped_count > 0)
                    .map(move |c| ClipFinding {
                        key: bin.key,
                        channel: c.channel.number(),
                        clipped: c.clipped_count,
                        captures: c.count,
                    })
            })
            .collect();

        if !findings.is_empty() {
            warn!(channels = findings.len(), "clipped captures accepted");
            if self.abort_on_clip {
                let first = &findings[0];
                return Err(AppError::PostProcess {
                    name: "ClipAudit",
                    reason: format!(
                        "CH{} clipped in {} of {} capture(s) at key {}",
                        first.channel, first.clipped, first.captures, first.key
                    ),
                });
            }
        }
        state.annotate("clip_audit", serde_json::to_value(findings)?);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CaptureBin, ChannelAverage};
    use bl_core::{CaptureId, ChannelId};

    fn state_with(voltages: Vec<f64>, clipped_count: u32) -> ExperimentState {
        let mut state = ExperimentState::new(CaptureId::generate(), 0, 30.0);
        state.bins.push(CaptureBin {
            key: 30.0,
            count: 2,
            mean_temperature: 30.1,
            channels: vec![ChannelAverage {
                channel: ChannelId::new(2),
                count: 2,
                clipped_count,
                range_indices: vec![5, 5],
                times: (0..voltages.len()).map(|i| i as f64).collect(),
                voltages,
            }],
        });
        state
    }

    #[test]
    fn stats_of_square_wave() {
        let state = state_with(vec![1.0, -1.0, 1.0, -1.0], 0);
        let state = WaveformStats.process(state).unwrap();
        let stats = &state.annotations["waveform_stats"][0];
        assert_eq!(stats["channel"], 2);
        assert_eq!(stats["mean"], 0.0);
        assert_eq!(stats["rms"], 1.0);
        assert_eq!(stats["peak_to_peak"], 2.0);
    }

    #[test]
    fn clip_audit_reports_or_aborts() {
        let state = ClipAudit::default()
            .process(state_with(vec![0.0], 1))
            .unwrap();
        assert_eq!(state.annotations["clip_audit"][0]["clipped"], 1);

        let err = ClipAudit {
            abort_on_clip: true,
        }
        .process(state_with(vec![0.0], 1))
        .unwrap_err();
        assert!(matches!(err, AppError::PostProcess { name: "ClipAudit", .. }));

        let clean = ClipAudit {
            abort_on_clip: true,
        }
        .process(state_with(vec![0.0], 0))
        .unwrap();
        assert_eq!(clean.annotations["clip_audit"], serde_json::json!([]));
    }

    #[test]
    fn chain_runs_in_order() {
        let mut chain: Vec<Box<dyn PostProcessor>> =
            vec![Box::new(WaveformStats), Box::new(ClipAudit::default())];
        let state = run_chain(&mut chain, state_with(vec![0.5, -0.5], 0)).unwrap();
        assert!(state.annotations.contains_key("waveform_stats"));
        assert!(state.annotations.contains_key("clip_audit"));
    }
}
