//! Vertical range table and per-channel range memory.

use std::collections::BTreeMap;

use bl_core::ChannelId;
use serde::{Deserialize, Serialize};

use crate::error::{AcquireError, AcquireResult};

/// Volts-per-division settings, strictly ascending.
///
/// Index 0 is the most sensitive range; moving up the table trades
/// resolution for headroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct VoltageSteps(Vec<f64>);

impl VoltageSteps {
    pub fn new(steps: Vec<f64>) -> AcquireResult<Self> {
        if steps.is_empty() {
            return Err(AcquireError::invalid_config("voltage step table is empty"));
        }
        if let Some(bad) = steps.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(AcquireError::invalid_config(format!(
                "voltage step {bad} is not a positive finite value"
            )));
        }
        if steps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AcquireError::invalid_config(
                "voltage steps must be strictly ascending",
            ));
        }
        Ok(Self(steps))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Index of the least sensitive range.
    pub fn last_index(&self) -> usize {
        self.0.len() - 1
    }

    /// Clamp a possibly stale index into the table.
    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.last_index())
    }

    /// `step[index] / step[index - 1]`, `None` at index 0.
    pub fn finer_ratio(&self, index: usize) -> Option<f64> {
        let finer = index.checked_sub(1)?;
        Some(self.get(index)? / self.get(finer)?)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Default for VoltageSteps {
    fn default() -> Self {
        Self(vec![5e-3, 1e-2, 2e-2, 5e-2, 1e-1, 2e-1])
    }
}

impl TryFrom<Vec<f64>> for VoltageSteps {
    type Error = AcquireError;

    fn try_from(steps: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<VoltageSteps> for Vec<f64> {
    fn from(steps: VoltageSteps) -> Self {
        steps.0
    }
}

/// Last known-good range index per channel.
///
/// Channels never accepted have no entry and start at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelRangeCache {
    entries: BTreeMap<ChannelId, usize>,
}

impl ChannelRangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: ChannelId) -> Option<usize> {
        self.entries.get(&channel).copied()
    }

    /// Starting index for a search on `channel`.
    pub fn start_index(&self, channel: ChannelId) -> usize {
        self.get(channel).unwrap_or(0)
    }

    pub fn commit(&mut self, channel: ChannelId, index: usize) {
        self.entries.insert(channel, index);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, usize)> + '_ {
        self.entries.iter().map(|(c, i)| (*c, *i))
    }
}
