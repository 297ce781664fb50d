//! Setpoint schedules.
//!
//! An experiment decides the regulator target for each iteration and how
//! long to let the temperature settle. Its position is persisted before
//! the settling wait, so a run that dies mid-wait resumes at the same
//! target.

use std::time::Duration;

use bl_results::{StateStore, SweepState, delete_state, load_state, save_state};
use tracing::{debug, info};

use crate::error::AppResult;

pub trait Experiment: Send {
    fn name(&self) -> &'static str;

    /// Pick up a persisted position. Called once before the first step.
    fn restore(&mut self, store: &dyn StateStore) -> AppResult<()>;

    /// Advance the schedule, persist the new position and return the target.
    fn step(&mut self, store: &dyn StateStore) -> AppResult<f64>;

    fn stabilize_time(&self) -> Duration;

    /// Forget the persisted position after a completed run.
    fn finish(&mut self, store: &dyn StateStore) -> AppResult<()>;
}

/// Sweeps the target between `min` and `max`, reversing at each bound.
#[derive(Debug, Clone)]
pub struct TemperatureSweep {
    min: f64,
    max: f64,
    step: f64,
    stabilize: Duration,
    position: Option<SweepState>,
    resumed: bool,
}

impl TemperatureSweep {
    pub fn new(min: f64, max: f64, step: f64, stabilize: Duration) -> Self {
        Self {
            min,
            max,
            step: step.abs(),
            stabilize,
            position: None,
            resumed: false,
        }
    }

    pub fn position(&self) -> Option<SweepState> {
        self.position
    }

    /// Next target, stopping on each bound before turning back.
    fn advance(&self, current: SweepState) -> SweepState {
        let mut step = current.step;
        let at_max = current.target >= self.max && step > 0.0;
        let at_min = current.target <= self.min && step < 0.0;
        if at_max || at_min {
            step = -step;
        }
        let next = (current.target + step).clamp(self.min, self.max);
        SweepState::new(next, step)
    }
}

impl Experiment for TemperatureSweep {
    fn name(&self) -> &'static str {
        "TemperatureSweep"
    }

    fn restore(&mut self, store: &dyn StateStore) -> AppResult<()> {
        if let Some(saved) = load_state::<SweepState>(store)? {
            info!(target = saved.target, step = saved.step, "resuming sweep");
            self.position = Some(saved);
            self.resumed = true;
        }
        Ok(())
    }

    fn step(&mut self, store: &dyn StateStore) -> AppResult<f64> {
        let next = match self.position {
            // First step after a resume repeats the interrupted target.
            Some(current) if self.resumed => current,
            Some(current) => self.advance(current),
            None => SweepState::new(self.min, self.step),
        };
        self.resumed = false;
        save_state(store, &next)?;
        self.position = Some(next);
        debug!(target = next.target, step = next.step, "sweep stepped");
        Ok(next.target)
    }

    fn stabilize_time(&self) -> Duration {
        self.stabilize
    }

    fn finish(&mut self, store: &dyn StateStore) -> AppResult<()> {
        delete_state::<SweepState>(store)?;
        Ok(())
    }
}

/// Holds one target for every iteration.
#[derive(Debug, Clone)]
pub struct TemperatureHold {
    target: f64,
    stabilize: Duration,
}

impl TemperatureHold {
    pub fn new(target: f64, stabilize: Duration) -> Self {
        Self { target, stabilize }
    }
}

impl Experiment for TemperatureHold {
    fn name(&self) -> &'static str {
        "TemperatureHold"
    }

    fn restore(&mut self, _store: &dyn StateStore) -> AppResult<()> {
        Ok(())
    }

    fn step(&mut self, _store: &dyn StateStore) -> AppResult<f64> {
        Ok(self.target)
    }

    fn stabilize_time(&self) -> Duration {
        self.stabilize
    }

    fn finish(&mut self, _store: &dyn StateStore) -> AppResult<()> {
        Ok(())
    }
}
