//! Persisted state and run manifest types.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// State blob with a fixed key and schema version.
pub trait VersionedState: Serialize + for<'de> Deserialize<'de> {
    const KEY: &'static str;
    const VERSION: u32;

    fn version(&self) -> u32;
}

/// Remaining iteration budget of an interrupted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    pub version: u32,
    /// `None` means unbounded.
    pub remaining_loops: Option<u64>,
    /// Fingerprint of the configuration that wrote this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl LoopState {
    pub fn new(remaining_loops: Option<u64>, config_hash: Option<String>) -> Self {
        Self {
            version: Self::VERSION,
            remaining_loops,
            config_hash,
        }
    }
}

impl VersionedState for LoopState {
    const KEY: &'static str = "loop_state";
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Position of a temperature sweep: current target and signed step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepState {
    pub version: u32,
    pub target: f64,
    pub step: f64,
}

impl SweepState {
    pub fn new(target: f64, step: f64) -> Self {
        Self {
            version: Self::VERSION,
            target,
            step,
        }
    }
}

impl VersionedState for SweepState {
    const KEY: &'static str = "sweep_state";
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Description of one run's record directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    /// RFC 3339 start time.
    pub started: String,
    pub experiment: String,
    pub capture: String,
    #[serde(default)]
    pub post_processors: Vec<String>,
    pub config_hash: String,
    pub tool_version: String,
}

impl RunManifest {
    pub fn new(
        run_id: impl Into<String>,
        started: DateTime<Local>,
        experiment: impl Into<String>,
        capture: impl Into<String>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            started: started.to_rfc3339(),
            experiment: experiment.into(),
            capture: capture.into(),
            post_processors: Vec::new(),
            config_hash: config_hash.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
