//! Per-iteration experiment record.
//!
//! Built up while an iteration runs, passed through the post-processors and
//! appended to the run's record file. Nothing keeps it afterwards.

use std::collections::BTreeMap;

use bl_core::{CaptureId, ChannelId};
use chrono::Local;
use serde::{Deserialize, Serialize};

/// Regulation quantities observed together under the regulator lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionReading {
    /// RFC 3339 time of the reading.
    pub time: String,
    pub target: f64,
    pub temperature: f64,
    pub output: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_current: Option<f64>,
}

/// Averaged waveform of one channel within a bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAverage {
    pub channel: ChannelId,
    /// Captures folded into the average.
    pub count: u32,
    /// Captures accepted while still clipping at the widest range.
    pub clipped_count: u32,
    /// Range index of every folded capture, in capture order.
    pub range_indices: Vec<usize>,
    pub times: Vec<f64>,
    pub voltages: Vec<f64>,
}

/// Captures taken at the same regulated condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureBin {
    /// Temperature rounded to the key resolution.
    pub key: f64,
    pub count: u32,
    pub mean_temperature: f64,
    pub channels: Vec<ChannelAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentState {
    pub capture_id: CaptureId,
    pub loop_index: u64,
    /// RFC 3339 start of the iteration.
    pub started: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<String>,
    pub target: f64,
    #[serde(default)]
    pub conditions: Vec<ConditionReading>,
    #[serde(default)]
    pub bins: Vec<CaptureBin>,
    /// Failed capture attempts retried during this iteration.
    #[serde(default)]
    pub capture_failures: u32,
    /// Free-form results added by post-processors.
    #[serde(default)]
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl ExperimentState {
    pub fn new(capture_id: CaptureId, loop_index: u64, target: f64) -> Self {
        Self {
            capture_id,
            loop_index,
            started: Local::now().to_rfc3339(),
            capture_time: None,
            target,
            conditions: Vec::new(),
            bins: Vec::new(),
            capture_failures: 0,
            annotations: BTreeMap::new(),
        }
    }

    pub fn mark_captured(&mut self) {
        self.capture_time = Some(Local::now().to_rfc3339());
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.annotations.insert(key.into(), value);
    }
}
