//! Adaptive waveform acquisition.
//!
//! [`AdaptiveAcquirer`] drives a [`WaveformInstrument`] and searches each
//! channel's vertical range for the best resolution without clipping,
//! sharing trigger round trips across channels.

pub mod acquirer;
pub mod error;
pub mod instrument;
pub mod range;
pub mod waveform;

pub use acquirer::{AcquireStats, AcquirerConfig, AdaptiveAcquirer, CaptureOutcome};
pub use error::{AcquireError, AcquireResult};
pub use instrument::{SampleWidth, ScalingHeader, WaveformInstrument};
pub use range::{ChannelRangeCache, VoltageSteps};
pub use waveform::{
    ChannelWaveform, ProbeSettings, WaveformSample, has_clipping, peak_deviation,
};
