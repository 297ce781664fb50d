//! Iteration timing and completion estimates.
//!
//! The orchestrator records the wall time of every loop and derives an
//! average duration and an estimated completion time from it.

use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};

/// Accumulates loop durations for a rolling average.
#[derive(Debug, Clone, Default)]
pub struct LoopTimer {
    total: Duration,
    count: u64,
}

impl LoopTimer {
    pub const fn new() -> Self {
        Self {
            total: Duration::ZERO,
            count: 0,
        }
    }

    /// Record one completed iteration.
    pub fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.count += 1;
    }

    /// Number of recorded iterations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Average iteration duration, `None` before the first record.
    pub fn average(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let count = u32::try_from(self.count).unwrap_or(u32::MAX);
        Some(self.total / count)
    }

    /// Time still needed for `remaining` iterations at the current average.
    ///
    /// `None` when the product does not fit in a `Duration`.
    pub fn remaining_time(&self, remaining: u64) -> Option<Duration> {
        let avg = self.average()?;
        Duration::try_from_secs_f64(avg.as_secs_f64() * remaining as f64).ok()
    }

    /// Estimated completion timestamp for `remaining` iterations from `now`.
    pub fn eta(&self, remaining: u64, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let left = self.remaining_time(remaining)?;
        let delta = TimeDelta::from_std(left).ok()?;
        now.checked_add_signed(delta)
    }
}

/// `H:MM:SS.mmm` rendering used in progress logs.
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs_f64();
    let hours = (total / 3600.0).floor();
    let rem = total - hours * 3600.0;
    let mins = (rem / 60.0).floor();
    let secs = rem - mins * 60.0;
    format!("{}:{:02}:{:06.3}", hours as u64, mins as u64, secs)
}
