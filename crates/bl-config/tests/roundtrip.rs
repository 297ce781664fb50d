use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use bl_config::schema::*;
use bl_config::{LATEST_VERSION, load_path, load_yaml, save_yaml, validate_config};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    dir
}

fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../configs")
}

fn hold_config() -> BenchConfig {
    BenchConfig {
        version: LATEST_VERSION,
        name: "hold".to_string(),
        regulator: RegulatorDef {
            sensor_channel: 1,
            read_attempts: 3,
            output_min: 0.0,
            output_max: 10.0,
            kp: 1.0,
            ki: 0.05,
            kd: 0.5,
            period_s: 1.0,
            invert: false,
            ramp: RampDef::default(),
            dry_run: false,
        },
        experiment: ExperimentDef {
            schedule: ScheduleDef::TemperatureHold {
                target: 30.0,
                stabilize_s: 10.0,
            },
            key_resolution: 1.0,
        },
        capture: CaptureDef::Conditions {},
        post_processors: vec![],
        run: RunDef::default(),
        simulation: None,
    }
}

#[test]
fn roundtrip_yaml_hold_config() {
    let config = hold_config();
    validate_config(&config).unwrap();

    let dir = unique_temp_dir("bl_config_roundtrip");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bench.yaml");

    save_yaml(&path, &config).unwrap();
    let loaded = load_yaml(&path).unwrap();
    assert_eq!(config, loaded);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn shipped_configs_load() {
    let sweep = load_path(&configs_dir().join("sim_sweep.yaml")).expect("sweep config");
    assert_eq!(sweep.experiment.schedule.kind(), "TemperatureSweep");
    assert_eq!(sweep.capture.kind(), "Scope");
    assert_eq!(sweep.post_processors.len(), 2);
    assert_eq!(sweep.run.max_loops, Some(8));

    let hold = load_path(&configs_dir().join("sim_hold.yaml")).expect("hold config");
    assert_eq!(hold.version, LATEST_VERSION);
    assert_eq!(hold.regulator.read_attempts, 3);
    assert_eq!(hold.experiment.key_resolution, 1.0);
    assert_eq!(hold.capture, CaptureDef::Conditions {});
}

#[test]
fn scope_defaults_fill_in() {
    let yaml = r#"
name: scope
regulator: {sensor_channel: 1, output_min: 0, output_max: 5, kp: 1, ki: 0, kd: 0, period_s: 0.5}
experiment:
  schedule: {type: TemperatureHold, target: 25, stabilize_s: 1}
capture:
  type: Scope
  channels: [1]
"#;
    let dir = unique_temp_dir("bl_config_defaults");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bench.yml");
    std::fs::write(&path, yaml).unwrap();

    let config = load_yaml(&path).unwrap();
    match config.capture {
        CaptureDef::Scope {
            voltage_steps,
            sample_width,
            trigger_timeout_s,
            captures_per_loop,
            fail_threshold,
            probe_margin,
            probe_headroom,
            ..
        } => {
            assert_eq!(voltage_steps.len(), 6);
            assert_eq!(sample_width, SampleWidthDef::Byte);
            assert_eq!(trigger_timeout_s, 10.0);
            assert_eq!(captures_per_loop, 1);
            assert_eq!(fail_threshold, 2);
            assert_eq!(probe_margin, 2);
            assert_eq!(probe_headroom, None);
        }
        other => panic!("unexpected capture {other:?}"),
    }
    assert_eq!(config.run.state_dir, PathBuf::from("state"));

    std::fs::remove_dir_all(&dir).ok();
}
