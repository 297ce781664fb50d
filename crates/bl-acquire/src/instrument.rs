//! Oscilloscope-like instrument seam.

use std::time::Duration;

use bl_core::ChannelId;
use serde::{Deserialize, Serialize};

use crate::error::AcquireResult;
use crate::waveform::WaveformSample;

/// Width of one raw sample as transferred by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleWidth {
    #[default]
    Byte,
    Word,
}

impl SampleWidth {
    /// Largest representable raw code.
    pub fn max_code(self) -> u16 {
        match self {
            SampleWidth::Byte => u8::MAX as u16,
            SampleWidth::Word => u16::MAX,
        }
    }

    /// Code of a zero-volt sample at zero offset.
    pub fn mid_code(self) -> u16 {
        match self {
            SampleWidth::Byte => 128,
            SampleWidth::Word => 32768,
        }
    }

    /// Codes that indicate the signal left the current range: the minimum
    /// code, the one above it, and the maximum code.
    pub fn is_clipping(self, code: u16) -> bool {
        code <= 1 || code >= self.max_code()
    }

    /// Default probe headroom, in codes from mid.
    pub fn default_headroom(self) -> u32 {
        u32::from(self.mid_code()) - 1
    }
}

/// Linear conversion reported by the instrument for one capture.
///
/// `time = (index - t_ref) * t_step + t_origin`,
/// `voltage = (code - v_ref) * v_step + v_origin`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingHeader {
    pub t_step: f64,
    pub t_origin: f64,
    pub t_ref: f64,
    pub v_step: f64,
    pub v_origin: f64,
    pub v_ref: f64,
}

impl ScalingHeader {
    pub fn time_at(&self, index: usize) -> f64 {
        (index as f64 - self.t_ref) * self.t_step + self.t_origin
    }

    pub fn voltage_of(&self, code: u16) -> f64 {
        (f64::from(code) - self.v_ref) * self.v_step + self.v_origin
    }

    /// Convert raw codes to `(index, code, time, voltage)` samples.
    pub fn process(&self, codes: &[u16]) -> Vec<WaveformSample> {
        codes
            .iter()
            .enumerate()
            .map(|(index, &code)| WaveformSample {
                index,
                code,
                time: self.time_at(index),
                voltage: self.voltage_of(code),
            })
            .collect()
    }
}

/// Instrument driven by the adaptive acquirer.
///
/// Implementations handle the wire protocol; this trait only carries the
/// operations the ranging search needs.
pub trait WaveformInstrument: Send {
    /// Prepare for adaptive capture with the given transfer width.
    fn initialize(&mut self, width: SampleWidth) -> AcquireResult<()>;

    /// Program the vertical range of `channel`.
    fn set_range(&mut self, channel: ChannelId, volts_per_div: f64) -> AcquireResult<()>;

    /// Arm, trigger once and wait for the acquisition to complete.
    ///
    /// Must fail with [`crate::AcquireError::Timeout`] when `timeout` passes.
    fn trigger_and_wait(&mut self, timeout: Duration) -> AcquireResult<()>;

    /// Raw codes captured on `channel` by the last trigger.
    fn read_raw(&mut self, channel: ChannelId) -> AcquireResult<Vec<u16>>;

    /// Scaling for the data last read from `channel`.
    fn scaling_header(&mut self, channel: ChannelId) -> AcquireResult<ScalingHeader>;
}

impl<I: WaveformInstrument + ?Sized> WaveformInstrument for Box<I> {
    fn initialize(&mut self, width: SampleWidth) -> AcquireResult<()> {
        (**self).initialize(width)
    }

    fn set_range(&mut self, channel: ChannelId, volts_per_div: f64) -> AcquireResult<()> {
        (**self).set_range(channel, volts_per_div)
    }

    fn trigger_and_wait(&mut self, timeout: Duration) -> AcquireResult<()> {
        (**self).trigger_and_wait(timeout)
    }

    fn read_raw(&mut self, channel: ChannelId) -> AcquireResult<Vec<u16>> {
        (**self).read_raw(channel)
    }

    fn scaling_header(&mut self, channel: ChannelId) -> AcquireResult<ScalingHeader> {
        (**self).scaling_header(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipping_codes_per_width() {
        let byte = SampleWidth::Byte;
        assert!(byte.is_clipping(0));
        assert!(byte.is_clipping(1));
        assert!(byte.is_clipping(255));
        assert!(!byte.is_clipping(2));
        assert!(!byte.is_clipping(254));

        let word = SampleWidth::Word;
        assert!(word.is_clipping(65535));
        assert!(!word.is_clipping(255));
        assert_eq!(word.default_headroom(), 32767);
        assert_eq!(byte.default_headroom(), 127);
    }

    #[test]
    fn header_scales_linearly() {
        let header = ScalingHeader {
            t_step: 1e-6,
            t_origin: -5e-4,
            t_ref: 0.0,
            v_step: 0.01,
            v_origin: 0.0,
            v_ref: 128.0,
        };
        let samples = header.process(&[128, 228, 28]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].voltage, 0.0);
        assert!((samples[1].voltage - 1.0).abs() < 1e-12);
        assert!((samples[2].voltage + 1.0).abs() < 1e-12);
        assert!((samples[2].time - (-5e-4 + 2e-6)).abs() < 1e-15);
        assert_eq!(samples[1].index, 1);
        assert_eq!(samples[1].code, 228);
    }
}
