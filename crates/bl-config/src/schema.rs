//! Bench configuration schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchConfig {
    /// Schema version. Files written before versioning carry none.
    #[serde(default)]
    pub version: u32,
    pub name: String,
    pub regulator: RegulatorDef,
    pub experiment: ExperimentDef,
    pub capture: CaptureDef,
    #[serde(default)]
    pub post_processors: Vec<PostProcessorDef>,
    #[serde(default)]
    pub run: RunDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegulatorDef {
    pub sensor_channel: u8,
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,
    pub output_min: f64,
    pub output_max: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub period_s: f64,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub ramp: RampDef,
    /// Drop every actuator command instead of sending it.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_read_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RampDef {
    pub threshold: f64,
    pub speed: f64,
    pub interval_s: f64,
    #[serde(default = "default_ramp_steps")]
    pub max_steps: u32,
}

fn default_ramp_steps() -> u32 {
    720
}

impl Default for RampDef {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            speed: 0.25,
            interval_s: 5.0,
            max_steps: default_ramp_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentDef {
    pub schedule: ScheduleDef,
    /// Granularity of the result key derived from the measured temperature.
    #[serde(default = "default_key_resolution")]
    pub key_resolution: f64,
}

fn default_key_resolution() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ScheduleDef {
    TemperatureSweep {
        min: f64,
        max: f64,
        step: f64,
        stabilize_s: f64,
    },
    TemperatureHold {
        target: f64,
        stabilize_s: f64,
    },
}

impl ScheduleDef {
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleDef::TemperatureSweep { .. } => "TemperatureSweep",
            ScheduleDef::TemperatureHold { .. } => "TemperatureHold",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SampleWidthDef {
    #[default]
    Byte,
    Word,
}

impl SampleWidthDef {
    /// Largest deviation from the midpoint a sample of this width can hold.
    pub fn mid_code(self) -> u32 {
        match self {
            SampleWidthDef::Byte => 127,
            SampleWidthDef::Word => 32767,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CaptureDef {
    Scope {
        channels: Vec<u8>,
        #[serde(default = "default_voltage_steps")]
        voltage_steps: Vec<f64>,
        #[serde(default)]
        sample_width: SampleWidthDef,
        #[serde(default = "default_trigger_timeout_s")]
        trigger_timeout_s: f64,
        #[serde(default = "default_captures_per_loop")]
        captures_per_loop: u32,
        #[serde(default = "default_fail_threshold")]
        fail_threshold: u32,
        #[serde(default = "default_probe_margin")]
        probe_margin: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        probe_headroom: Option<u32>,
    },
    Conditions {},
}

impl CaptureDef {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureDef::Scope { .. } => "Scope",
            CaptureDef::Conditions {} => "Conditions",
        }
    }
}

fn default_voltage_steps() -> Vec<f64> {
    vec![5e-3, 1e-2, 2e-2, 5e-2, 1e-1, 2e-1]
}

fn default_trigger_timeout_s() -> f64 {
    10.0
}

fn default_captures_per_loop() -> u32 {
    1
}

fn default_fail_threshold() -> u32 {
    2
}

fn default_probe_margin() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PostProcessorDef {
    WaveformStats,
    ClipAudit {
        /// Fail the iteration instead of only reporting.
        #[serde(default)]
        abort_on_clip: bool,
    },
}

impl PostProcessorDef {
    pub fn kind(&self) -> &'static str {
        match self {
            PostProcessorDef::WaveformStats => "WaveformStats",
            PostProcessorDef::ClipAudit { .. } => "ClipAudit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunDef {
    /// Iteration budget. Absent means run until interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loops: Option<u64>,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
}

impl Default for RunDef {
    fn default() -> Self {
        Self {
            max_loops: None,
            state_dir: default_state_dir(),
            result_dir: default_result_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Parameters of the simulated bench.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationDef {
    #[serde(default)]
    pub plant: PlantDef,
    #[serde(default = "default_supply_max_voltage")]
    pub supply_max_voltage: f64,
    /// Simulated seconds per wall-clock second.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    #[serde(default)]
    pub signals: Vec<SignalDef>,
}

impl Default for SimulationDef {
    fn default() -> Self {
        Self {
            plant: PlantDef::default(),
            supply_max_voltage: default_supply_max_voltage(),
            time_scale: default_time_scale(),
            signals: Vec::new(),
        }
    }
}

fn default_supply_max_voltage() -> f64 {
    12.0
}

fn default_time_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantDef {
    pub ambient: f64,
    pub initial: f64,
    pub heater_resistance: f64,
    pub heater_capacity: f64,
    pub sample_capacity: f64,
    pub coupling: f64,
    pub loss: f64,
}

impl Default for PlantDef {
    fn default() -> Self {
        Self {
            ambient: 22.0,
            initial: 22.0,
            heater_resistance: 4.0,
            heater_capacity: 20.0,
            sample_capacity: 100.0,
            coupling: 5.0,
            loss: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalDef {
    pub channel: u8,
    pub amplitude: f64,
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,
    #[serde(default)]
    pub tempco: f64,
}

fn default_frequency_hz() -> f64 {
    1e3
}
