//! Translation of the configuration file into runtime components.
//!
//! Experiment, capture and post-processor kinds are closed sets keyed by
//! the `type` tag in the file; each tag maps to one constructor here.

use std::time::Duration;

use bl_acquire::{
    AcquirerConfig, AdaptiveAcquirer, ProbeSettings, SampleWidth, VoltageSteps,
    WaveformInstrument,
};
use bl_config::{
    CaptureDef, ExperimentDef, PostProcessorDef, RegulatorDef, SampleWidthDef, ScheduleDef,
};
use bl_controls::{
    ControlError, PidConfig, PidGains, RampConfig, SamplePeriod, TemperatureRegulatorConfig,
};
use bl_core::{ChannelId, Limit};

use crate::capture::{CaptureMode, ConditionsCapture, ScopeCapture};
use crate::error::{AppError, AppResult};
use crate::experiment::{Experiment, TemperatureHold, TemperatureSweep};
use crate::postprocess::{ClipAudit, PostProcessor, WaveformStats};

pub const EXPERIMENT_KINDS: &[&str] = &["TemperatureSweep", "TemperatureHold"];
pub const CAPTURE_KINDS: &[&str] = &["Scope", "Conditions"];
pub const POST_PROCESSOR_KINDS: &[&str] = &["WaveformStats", "ClipAudit"];

pub fn regulator_config(def: &RegulatorDef) -> AppResult<TemperatureRegulatorConfig> {
    let limit = Limit::new(def.output_min, def.output_max).map_err(ControlError::from)?;
    let ramp = RampConfig {
        threshold: def.ramp.threshold,
        speed: def.ramp.speed,
        interval_s: def.ramp.interval_s,
        max_steps: def.ramp.max_steps,
    };
    ramp.validate()?;
    Ok(TemperatureRegulatorConfig {
        pid: PidConfig {
            limit,
            gains: PidGains::new(def.kp, def.ki, def.kd),
            period: SamplePeriod::new(def.period_s)?,
            invert: def.invert,
        },
        ramp,
    })
}

fn seconds(value: f64, what: &str) -> AppResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| AppError::InvalidInput(format!("{what} must be a non-negative duration")))
}

pub fn build_experiment(def: &ExperimentDef) -> AppResult<Box<dyn Experiment>> {
    Ok(match def.schedule {
        ScheduleDef::TemperatureSweep {
            min,
            max,
            step,
            stabilize_s,
        } => Box::new(TemperatureSweep::new(
            min,
            max,
            step,
            seconds(stabilize_s, "stabilize_s")?,
        )),
        ScheduleDef::TemperatureHold {
            target,
            stabilize_s,
        } => Box::new(TemperatureHold::new(
            target,
            seconds(stabilize_s, "stabilize_s")?,
        )),
    })
}

/// Acquirer settings for a scope capture, `None` for other kinds.
pub fn acquirer_config(def: &CaptureDef) -> AppResult<Option<AcquirerConfig>> {
    let CaptureDef::Scope {
        voltage_steps,
        sample_width,
        trigger_timeout_s,
        probe_margin,
        probe_headroom,
        ..
    } = def
    else {
        return Ok(None);
    };
    Ok(Some(AcquirerConfig {
        voltage_steps: VoltageSteps::new(voltage_steps.clone())?,
        sample_width: match sample_width {
            SampleWidthDef::Byte => SampleWidth::Byte,
            SampleWidthDef::Word => SampleWidth::Word,
        },
        trigger_timeout: seconds(*trigger_timeout_s, "trigger_timeout_s")?,
        probe: ProbeSettings {
            margin: *probe_margin,
            headroom: *probe_headroom,
        },
    }))
}

/// Build the capture mode. A scope capture needs an instrument.
pub fn build_capture(
    def: &CaptureDef,
    instrument: Option<Box<dyn WaveformInstrument>>,
) -> AppResult<Box<dyn CaptureMode>> {
    match def {
        CaptureDef::Conditions {} => Ok(Box::new(ConditionsCapture)),
        CaptureDef::Scope {
            channels,
            captures_per_loop,
            fail_threshold,
            ..
        } => {
            let instrument = instrument.ok_or_else(|| {
                AppError::InvalidInput("scope capture needs an instrument".to_string())
            })?;
            let config = acquirer_config(def)?.ok_or_else(|| {
                AppError::InvalidInput("scope capture without acquirer settings".to_string())
            })?;
            Ok(Box::new(ScopeCapture::new(
                AdaptiveAcquirer::new(instrument, config),
                channels.iter().map(|c| ChannelId::new(u32::from(*c))).collect(),
                *captures_per_loop,
                *fail_threshold,
            )))
        }
    }
}

pub fn build_post_processor(def: &PostProcessorDef) -> Box<dyn PostProcessor> {
    match def {
        PostProcessorDef::WaveformStats => Box::new(WaveformStats),
        PostProcessorDef::ClipAudit { abort_on_clip } => Box::new(ClipAudit {
            abort_on_clip: *abort_on_clip,
        }),
    }
}

pub fn build_post_processors(defs: &[PostProcessorDef]) -> Vec<Box<dyn PostProcessor>> {
    defs.iter().map(build_post_processor).collect()
}

/// Parse a post-processor given by name, as on the command line.
pub fn post_processor_from_name(name: &str) -> AppResult<PostProcessorDef> {
    match name {
        "WaveformStats" => Ok(PostProcessorDef::WaveformStats),
        "ClipAudit" => Ok(PostProcessorDef::ClipAudit {
            abort_on_clip: false,
        }),
        other => Err(AppError::InvalidInput(format!(
            "unknown post-processor '{other}', expected one of {}",
            POST_PROCESSOR_KINDS.join(", ")
        ))),
    }
}
