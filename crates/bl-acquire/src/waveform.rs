//! Captured waveforms and the resolution probe.

use bl_core::ChannelId;
use serde::{Deserialize, Serialize};

use crate::instrument::SampleWidth;

/// One processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformSample {
    pub index: usize,
    pub code: u16,
    pub time: f64,
    pub voltage: f64,
}

/// Accepted capture for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelWaveform {
    pub channel: ChannelId,
    pub range_index: usize,
    pub volts_per_div: f64,
    /// Accepted at the least sensitive range despite clipping.
    pub clipped: bool,
    pub samples: Vec<WaveformSample>,
}

impl ChannelWaveform {
    pub fn voltages(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.voltage)
    }
}

/// True if any code hits a clipping value for `width`.
pub fn has_clipping(codes: &[u16], width: SampleWidth) -> bool {
    codes.iter().any(|&c| width.is_clipping(c))
}

/// Largest distance of any code from mid scale.
pub fn peak_deviation(codes: &[u16], width: SampleWidth) -> u32 {
    let mid = i32::from(width.mid_code());
    codes
        .iter()
        .map(|&c| (i32::from(c) - mid).unsigned_abs())
        .max()
        .unwrap_or(0)
}

/// Settings for the one-step finer-range probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Codes added to the observed peak before projecting.
    pub margin: u32,
    /// Largest projected deviation from mid that still counts as fitting.
    /// `None` uses `mid - 1` for the sample width.
    pub headroom: Option<u32>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            margin: 2,
            headroom: None,
        }
    }
}

impl ProbeSettings {
    pub fn headroom_for(&self, width: SampleWidth) -> u32 {
        self.headroom.unwrap_or_else(|| width.default_headroom())
    }

    /// Projected peak deviation on the next finer range.
    ///
    /// `ratio` is `step[current] / step[finer]`.
    pub fn projected_peak(&self, codes: &[u16], width: SampleWidth, ratio: f64) -> f64 {
        f64::from(peak_deviation(codes, width).saturating_add(self.margin)) * ratio
    }

    /// Whether the signal would still fit one range finer.
    pub fn fits_finer(&self, codes: &[u16], width: SampleWidth, ratio: f64) -> bool {
        self.projected_peak(codes, width, ratio) <= f64::from(self.headroom_for(width))
    }
}
