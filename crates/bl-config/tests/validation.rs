use bl_config::schema::*;
use bl_config::{ValidationError, validate_config};

fn base() -> BenchConfig {
    BenchConfig {
        version: 1,
        name: "v".to_string(),
        regulator: RegulatorDef {
            sensor_channel: 1,
            read_attempts: 3,
            output_min: 0.0,
            output_max: 10.0,
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            period_s: 1.0,
            invert: false,
            ramp: RampDef::default(),
            dry_run: true,
        },
        experiment: ExperimentDef {
            schedule: ScheduleDef::TemperatureSweep {
                min: 25.0,
                max: 35.0,
                step: 5.0,
                stabilize_s: 30.0,
            },
            key_resolution: 1.0,
        },
        capture: CaptureDef::Scope {
            channels: vec![1, 2],
            voltage_steps: vec![0.01, 0.1],
            sample_width: SampleWidthDef::Byte,
            trigger_timeout_s: 5.0,
            captures_per_loop: 2,
            fail_threshold: 2,
            probe_margin: 2,
            probe_headroom: None,
        },
        post_processors: vec![PostProcessorDef::WaveformStats],
        run: RunDef::default(),
        simulation: Some(SimulationDef {
            signals: vec![
                SignalDef {
                    channel: 1,
                    amplitude: 0.03,
                    frequency_hz: 1e3,
                    tempco: 0.0,
                },
                SignalDef {
                    channel: 2,
                    amplitude: 0.3,
                    frequency_hz: 1e3,
                    tempco: 0.0,
                },
            ],
            ..SimulationDef::default()
        }),
    }
}

fn field_of(err: ValidationError) -> String {
    match err {
        ValidationError::InvalidValue { field, .. } => field,
        other => panic!("expected invalid value, got {other:?}"),
    }
}

#[test]
fn base_config_is_valid() {
    validate_config(&base()).unwrap();
}

#[test]
fn inverted_output_limit_rejected() {
    let mut config = base();
    config.regulator.output_min = 11.0;
    let err = validate_config(&config).unwrap_err();
    assert_eq!(field_of(err), "regulator.output_min");
}

#[test]
fn non_positive_period_rejected() {
    let mut config = base();
    config.regulator.period_s = 0.0;
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "regulator.period_s"
    );
}

#[test]
fn zero_read_attempts_rejected() {
    let mut config = base();
    config.regulator.read_attempts = 0;
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "regulator.read_attempts"
    );
}

#[test]
fn unordered_voltage_steps_rejected() {
    let mut config = base();
    if let CaptureDef::Scope { voltage_steps, .. } = &mut config.capture {
        *voltage_steps = vec![0.1, 0.1];
    }
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "capture.voltage_steps"
    );
}

#[test]
fn duplicate_channels_rejected() {
    let mut config = base();
    if let CaptureDef::Scope { channels, .. } = &mut config.capture {
        *channels = vec![2, 2];
    }
    assert!(matches!(
        validate_config(&config),
        Err(ValidationError::DuplicateChannel { channel: 2, .. })
    ));
}

#[test]
fn capture_channel_needs_simulated_signal() {
    let mut config = base();
    if let CaptureDef::Scope { channels, .. } = &mut config.capture {
        channels.push(3);
    }
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "capture.channels"
    );
}

#[test]
fn probe_limits_bounded_by_sample_width() {
    let mut config = base();
    if let CaptureDef::Scope { probe_margin, .. } = &mut config.capture {
        *probe_margin = u32::MAX;
    }
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "capture.probe_margin"
    );

    let mut config = base();
    if let CaptureDef::Scope { probe_headroom, .. } = &mut config.capture {
        *probe_headroom = Some(128);
    }
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "capture.probe_headroom"
    );

    // the same headroom fits a 16-bit sample
    if let CaptureDef::Scope { sample_width, .. } = &mut config.capture {
        *sample_width = SampleWidthDef::Word;
    }
    validate_config(&config).unwrap();
}

#[test]
fn zero_ramp_step_limit_rejected() {
    let mut config = base();
    config.regulator.ramp.max_steps = 0;
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "regulator.ramp.max_steps"
    );
}

#[test]
fn sweep_bounds_checked() {
    let mut config = base();
    config.experiment.schedule = ScheduleDef::TemperatureSweep {
        min: 40.0,
        max: 30.0,
        step: 1.0,
        stabilize_s: 1.0,
    };
    assert_eq!(
        field_of(validate_config(&config).unwrap_err()),
        "experiment.schedule.min"
    );
}

#[test]
fn zero_loop_budget_rejected() {
    let mut config = base();
    config.run.max_loops = Some(0);
    assert_eq!(field_of(validate_config(&config).unwrap_err()), "run.max_loops");
}

#[test]
fn future_version_rejected() {
    let mut config = base();
    config.version = 99;
    assert_eq!(
        validate_config(&config),
        Err(ValidationError::UnsupportedVersion { version: 99 })
    );
}
