//! Adaptive multi-channel ranging.
//!
//! Each call searches every requested channel for the most sensitive range
//! that does not clip. Channels are searched together: one trigger per
//! round serves every channel still searching, so the number of round trips
//! is set by the slowest channel, not by the sum over channels.
//!
//! Per round, for each active channel:
//! - clipped with an accepted capture already in hand: keep that capture,
//!   restore its range and resolve
//! - clipped at the least sensitive range: accept as best effort
//! - clipped otherwise: move one range less sensitive
//! - clean: accept and remember the range; in the first round of a call,
//!   try one range finer if the projected peak fits, else resolve
//!
//! The finer-range probe only runs in round 0 so a channel that just
//! climbed out of clipping never oscillates back down.

use std::collections::HashSet;
use std::time::Duration;

use bl_core::ChannelId;
use tracing::{debug, info, trace, warn};

use crate::error::{AcquireError, AcquireResult};
use crate::instrument::{SampleWidth, WaveformInstrument};
use crate::range::{ChannelRangeCache, VoltageSteps};
use crate::waveform::{ChannelWaveform, ProbeSettings, has_clipping};

/// Acquirer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquirerConfig {
    pub voltage_steps: VoltageSteps,
    pub sample_width: SampleWidth,
    pub trigger_timeout: Duration,
    pub probe: ProbeSettings,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            voltage_steps: VoltageSteps::default(),
            sample_width: SampleWidth::Byte,
            trigger_timeout: Duration::from_secs(10),
            probe: ProbeSettings::default(),
        }
    }
}

/// Result of one [`AdaptiveAcquirer::capture`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    /// One waveform per requested channel, in request order.
    pub waveforms: Vec<ChannelWaveform>,
    /// Trigger round trips used.
    pub rounds: u32,
}

impl CaptureOutcome {
    pub fn get(&self, channel: ChannelId) -> Option<&ChannelWaveform> {
        self.waveforms.iter().find(|w| w.channel == channel)
    }
}

/// Running totals over the acquirer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireStats {
    pub calls: u64,
    pub triggers: u64,
    pub reinitializations: u64,
}

struct Search {
    channel: ChannelId,
    index: usize,
    accepted: Option<ChannelWaveform>,
    resolved: bool,
}

/// Auto-ranging waveform capture against one instrument.
pub struct AdaptiveAcquirer {
    instrument: Box<dyn WaveformInstrument>,
    config: AcquirerConfig,
    cache: ChannelRangeCache,
    ready: bool,
    stats: AcquireStats,
}

impl AdaptiveAcquirer {
    pub fn new(instrument: Box<dyn WaveformInstrument>, config: AcquirerConfig) -> Self {
        Self {
            instrument,
            config,
            cache: ChannelRangeCache::new(),
            ready: false,
            stats: AcquireStats::default(),
        }
    }

    pub fn config(&self) -> &AcquirerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ChannelRangeCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ChannelRangeCache {
        &mut self.cache
    }

    pub fn stats(&self) -> AcquireStats {
        self.stats
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Prepare the instrument. Range memory starts empty.
    pub fn initialize(&mut self) -> AcquireResult<()> {
        self.ready = false;
        self.instrument.initialize(self.config.sample_width)?;
        self.cache.reset();
        self.ready = true;
        debug!(width = ?self.config.sample_width, "acquirer initialized");
        Ok(())
    }

    /// Re-initialize after a failed capture.
    pub fn reinitialize(&mut self) -> AcquireResult<()> {
        self.stats.reinitializations += 1;
        warn!("reinitializing acquisition instrument");
        self.initialize()
    }

    /// Capture every channel in `channels` at its best range.
    ///
    /// Any instrument error aborts the call. Range memory is only updated
    /// for channels that had a capture accepted before the failure.
    pub fn capture(&mut self, channels: &[ChannelId]) -> AcquireResult<CaptureOutcome> {
        if !self.ready {
            return Err(AcquireError::NotInitialized);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = channels.iter().find(|c| !seen.insert(**c)) {
            return Err(AcquireError::invalid_config(format!(
                "channel {dup} requested twice"
            )));
        }
        self.stats.calls += 1;

        let steps = &self.config.voltage_steps;
        let mut searches: Vec<Search> = channels
            .iter()
            .map(|&channel| Search {
                channel,
                index: steps.clamp_index(self.cache.start_index(channel)),
                accepted: None,
                resolved: false,
            })
            .collect();

        let mut round: u32 = 0;
        while searches.iter().any(|s| !s.resolved) {
            self.run_round(&mut searches, round)?;
            round += 1;
        }

        let waveforms = searches
            .into_iter()
            .filter_map(|s| s.accepted)
            .collect::<Vec<_>>();
        info!(channels = waveforms.len(), rounds = round, "capture complete");
        Ok(CaptureOutcome {
            waveforms,
            rounds: round,
        })
    }

    fn run_round(&mut self, searches: &mut [Search], round: u32) -> AcquireResult<()> {
        let steps = &self.config.voltage_steps;
        let width = self.config.sample_width;

        for s in searches.iter().filter(|s| !s.resolved) {
            let vpd = range_value(steps, s.index)?;
            self.instrument.set_range(s.channel, vpd)?;
        }

        self.instrument
            .trigger_and_wait(self.config.trigger_timeout)?;
        self.stats.triggers += 1;

        for s in searches.iter_mut().filter(|s| !s.resolved) {
            let codes = self.instrument.read_raw(s.channel)?;
            if codes.is_empty() {
                return Err(AcquireError::InvalidResponse {
                    channel: s.channel,
                    message: "empty waveform".to_string(),
                });
            }
            let vpd = range_value(steps, s.index)?;

            if has_clipping(&codes, width) {
                if let Some(good) = s.accepted.as_ref() {
                    self.instrument.set_range(s.channel, good.volts_per_div)?;
                    s.index = good.range_index;
                    s.resolved = true;
                    trace!(channel = %s.channel, round, "clipped after accept, keeping previous");
                } else if s.index >= steps.last_index() {
                    let header = self.instrument.scaling_header(s.channel)?;
                    s.accepted = Some(ChannelWaveform {
                        channel: s.channel,
                        range_index: s.index,
                        volts_per_div: vpd,
                        clipped: true,
                        samples: header.process(&codes),
                    });
                    self.cache.commit(s.channel, s.index);
                    s.resolved = true;
                    warn!(channel = %s.channel, vpd, "signal clips at the widest range");
                } else {
                    s.index += 1;
                    trace!(channel = %s.channel, round, index = s.index, "clipped, widening range");
                }
                continue;
            }

            let header = self.instrument.scaling_header(s.channel)?;
            s.accepted = Some(ChannelWaveform {
                channel: s.channel,
                range_index: s.index,
                volts_per_div: vpd,
                clipped: false,
                samples: header.process(&codes),
            });
            self.cache.commit(s.channel, s.index);

            let finer = match steps.finer_ratio(s.index) {
                Some(ratio) if round == 0 => {
                    self.config.probe.fits_finer(&codes, width, ratio)
                }
                _ => false,
            };
            if finer {
                s.index -= 1;
                trace!(channel = %s.channel, index = s.index, "probing finer range");
            } else {
                s.resolved = true;
            }
        }
        Ok(())
    }
}

fn range_value(steps: &VoltageSteps, index: usize) -> AcquireResult<f64> {
    steps
        .get(index)
        .ok_or_else(|| AcquireError::invalid_config(format!("range index {index} out of table")))
}
