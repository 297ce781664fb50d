//! Discrete PID controller state and update law.
//!
//! The update law is the positional form with:
//! - integral accumulated in output units and clamped to the output limit
//!   every step (anti-windup)
//! - derivative taken on the measurement, not on the error, so a setpoint
//!   change does not kick the output
//! - integral and derivative gains pre-scaled by the sampling period
//!
//! This module holds no threads or locks; [`crate::regulator::PidRegulator`]
//! drives it from its control thread.

use bl_core::Limit;
use serde::{Deserialize, Serialize};

use crate::sampled::SamplePeriod;

/// Physical PID tuning, independent of the sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (per second).
    pub ki: f64,
    /// Derivative gain (seconds).
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// One evaluated control step, kept for tracing and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidStep {
    pub input: f64,
    pub error: f64,
    pub p_term: f64,
    pub integral: f64,
    pub d_term: f64,
    pub output: f64,
}

/// Controller state.
///
/// `output_value` and `integral` are always inside `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct PidState {
    limit: Limit,
    target: f64,
    integral: f64,
    output_value: f64,
    p_gain: f64,
    i_gain: f64,
    d_gain: f64,
    period: SamplePeriod,
    previous_input: f64,
    inverted: bool,
}

impl PidState {
    /// Build a controller state.
    ///
    /// `initial` seeds both the output and the integral (clamped), and
    /// `first_input` seeds the derivative history so the first step has no
    /// derivative kick.
    pub fn new(
        limit: Limit,
        gains: PidGains,
        period: SamplePeriod,
        inverted: bool,
        initial: f64,
        target: f64,
        first_input: f64,
    ) -> Self {
        let mut state = Self {
            limit,
            target,
            integral: limit.clamp(initial),
            output_value: limit.clamp(initial),
            p_gain: 0.0,
            i_gain: 0.0,
            d_gain: 0.0,
            period,
            previous_input: first_input,
            inverted,
        };
        state.set_parameters(gains);
        state
    }

    /// Replace the tuning, re-applying period scaling and inversion.
    pub fn set_parameters(&mut self, gains: PidGains) {
        let period = self.period.as_secs_f64();
        let sign = if self.inverted { -1.0 } else { 1.0 };
        self.p_gain = sign * gains.kp;
        self.i_gain = sign * gains.ki * period;
        self.d_gain = sign * gains.kd / period;
    }

    /// Change the sampling period, rescaling the period-dependent gains so
    /// the physical tuning is unchanged.
    pub fn rescale_period(&mut self, period: SamplePeriod) {
        let ratio = period.ratio_to(self.period);
        self.i_gain *= ratio;
        self.d_gain /= ratio;
        self.period = period;
    }

    /// Evaluate one control step for the measurement `input_current`.
    ///
    /// Updates the integral, output and derivative history and returns the
    /// breakdown. The caller is responsible for writing `output` to the
    /// actuator.
    pub fn update(&mut self, input_current: f64) -> PidStep {
        let error = self.target - input_current;

        self.integral = self.limit.clamp(self.integral + self.i_gain * error);
        let input_diff = self.previous_input - input_current;

        let p_term = self.p_gain * error;
        let d_term = -self.d_gain * input_diff;
        self.output_value = self.limit.clamp(p_term + self.integral + d_term);
        self.previous_input = input_current;

        PidStep {
            input: input_current,
            error,
            p_term,
            integral: self.integral,
            d_term,
            output: self.output_value,
        }
    }

    /// Force the output to the safe value `clamp(0)` and return it.
    pub fn force_safe_output(&mut self) -> f64 {
        self.output_value = self.limit.clamp(0.0);
        self.output_value
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Replace the output limit and pull the state back inside it.
    pub fn set_limit(&mut self, limit: Limit) {
        self.limit = limit;
        self.integral = limit.clamp(self.integral);
        self.output_value = limit.clamp(self.output_value);
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn output_value(&self) -> f64 {
        self.output_value
    }

    pub fn previous_input(&self) -> f64 {
        self.previous_input
    }

    pub fn period(&self) -> SamplePeriod {
        self.period
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Effective (scaled, signed) gains `(p, i, d)`.
    pub fn scaled_gains(&self) -> (f64, f64, f64) {
        (self.p_gain, self.i_gain, self.d_gain)
    }
}
