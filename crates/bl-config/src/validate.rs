//! Configuration validation.

use std::collections::HashSet;

use crate::schema::{BenchConfig, CaptureDef, RegulatorDef, ScheduleDef, SimulationDef};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate channel: {channel} in {context}")]
    DuplicateChannel { channel: u8, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be positive"))
    }
}

fn finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, value, "must be finite"))
    }
}

pub fn validate_config(config: &BenchConfig) -> Result<(), ValidationError> {
    if config.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }

    validate_regulator(&config.regulator)?;
    validate_schedule(&config.experiment.schedule)?;
    positive("experiment.key_resolution", config.experiment.key_resolution)?;
    validate_capture(&config.capture)?;

    if config.run.max_loops == Some(0) {
        return Err(invalid("run.max_loops", 0, "must be at least 1 when set"));
    }

    if let Some(sim) = &config.simulation {
        validate_simulation(sim, &config.capture)?;
    }

    Ok(())
}

fn validate_regulator(reg: &RegulatorDef) -> Result<(), ValidationError> {
    if reg.read_attempts == 0 {
        return Err(invalid("regulator.read_attempts", 0, "must be at least 1"));
    }
    finite("regulator.output_min", reg.output_min)?;
    finite("regulator.output_max", reg.output_max)?;
    if reg.output_min > reg.output_max {
        return Err(invalid(
            "regulator.output_min",
            reg.output_min,
            "exceeds output_max",
        ));
    }
    finite("regulator.kp", reg.kp)?;
    finite("regulator.ki", reg.ki)?;
    finite("regulator.kd", reg.kd)?;
    positive("regulator.period_s", reg.period_s)?;
    finite("regulator.ramp.threshold", reg.ramp.threshold)?;
    positive("regulator.ramp.speed", reg.ramp.speed)?;
    positive("regulator.ramp.interval_s", reg.ramp.interval_s)?;
    if reg.ramp.max_steps == 0 {
        return Err(invalid("regulator.ramp.max_steps", 0, "must be at least 1"));
    }
    Ok(())
}

fn validate_schedule(schedule: &ScheduleDef) -> Result<(), ValidationError> {
    match schedule {
        ScheduleDef::TemperatureSweep {
            min,
            max,
            step,
            stabilize_s,
        } => {
            finite("experiment.schedule.min", *min)?;
            finite("experiment.schedule.max", *max)?;
            if min > max {
                return Err(invalid("experiment.schedule.min", min, "exceeds max"));
            }
            positive("experiment.schedule.step", *step)?;
            positive("experiment.schedule.stabilize_s", *stabilize_s)?;
        }
        ScheduleDef::TemperatureHold {
            target,
            stabilize_s,
        } => {
            finite("experiment.schedule.target", *target)?;
            positive("experiment.schedule.stabilize_s", *stabilize_s)?;
        }
    }
    Ok(())
}

fn validate_capture(capture: &CaptureDef) -> Result<(), ValidationError> {
    let CaptureDef::Scope {
        channels,
        voltage_steps,
        trigger_timeout_s,
        captures_per_loop,
        sample_width,
        probe_margin,
        probe_headroom,
        ..
    } = capture
    else {
        return Ok(());
    };

    if channels.is_empty() {
        return Err(invalid("capture.channels", "[]", "at least one channel"));
    }
    let mut seen = HashSet::new();
    for channel in channels {
        if !seen.insert(channel) {
            return Err(ValidationError::DuplicateChannel {
                channel: *channel,
                context: "capture.channels".to_string(),
            });
        }
    }

    if voltage_steps.is_empty() {
        return Err(invalid("capture.voltage_steps", "[]", "must not be empty"));
    }
    for (i, step) in voltage_steps.iter().enumerate() {
        positive(&format!("capture.voltage_steps[{i}]"), *step)?;
    }
    if voltage_steps.windows(2).any(|w| w[0] >= w[1]) {
        return Err(invalid(
            "capture.voltage_steps",
            format!("{voltage_steps:?}"),
            "must be strictly ascending",
        ));
    }

    positive("capture.trigger_timeout_s", *trigger_timeout_s)?;
    if *captures_per_loop == 0 {
        return Err(invalid("capture.captures_per_loop", 0, "must be at least 1"));
    }

    let mid = sample_width.mid_code();
    if *probe_margin > mid {
        return Err(invalid(
            "capture.probe_margin",
            probe_margin,
            &format!("exceeds the {mid} code half-range of the sample width"),
        ));
    }
    if let Some(headroom) = probe_headroom
        && *headroom > mid
    {
        return Err(invalid(
            "capture.probe_headroom",
            headroom,
            &format!("exceeds the {mid} code half-range of the sample width"),
        ));
    }
    Ok(())
}

fn validate_simulation(sim: &SimulationDef, capture: &CaptureDef) -> Result<(), ValidationError> {
    positive("simulation.supply_max_voltage", sim.supply_max_voltage)?;
    positive("simulation.time_scale", sim.time_scale)?;
    let p = &sim.plant;
    finite("simulation.plant.ambient", p.ambient)?;
    finite("simulation.plant.initial", p.initial)?;
    positive("simulation.plant.heater_resistance", p.heater_resistance)?;
    positive("simulation.plant.heater_capacity", p.heater_capacity)?;
    positive("simulation.plant.sample_capacity", p.sample_capacity)?;
    positive("simulation.plant.coupling", p.coupling)?;
    if !p.loss.is_finite() || p.loss < 0.0 {
        return Err(invalid("simulation.plant.loss", p.loss, "must be non-negative"));
    }

    let mut seen = HashSet::new();
    for signal in &sim.signals {
        if !seen.insert(signal.channel) {
            return Err(ValidationError::DuplicateChannel {
                channel: signal.channel,
                context: "simulation.signals".to_string(),
            });
        }
        finite("simulation.signals.amplitude", signal.amplitude)?;
        positive("simulation.signals.frequency_hz", signal.frequency_hz)?;
    }

    if let CaptureDef::Scope { channels, .. } = capture {
        for channel in channels {
            if !seen.contains(channel) {
                return Err(invalid(
                    "capture.channels",
                    channel,
                    "no simulated signal on this channel",
                ));
            }
        }
    }
    Ok(())
}
