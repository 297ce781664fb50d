//! Threaded PID regulator.
//!
//! [`PidRegulator`] owns a [`PidState`] together with the input and output
//! callbacks and runs the control law on a dedicated thread, once per
//! sampling period. All controller state sits behind one mutex which the
//! control thread holds for the whole read-compute-write step; callers take
//! the same lock through [`PidRegulator::lock`] when they need several
//! values observed together.
//!
//! A failing or panicking step forces the output to `clamp(0)`, stops the
//! loop and parks the error until the owner collects it with
//! [`PidRegulator::take_fault`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bl_core::Limit;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

use crate::controller::{PidGains, PidState};
use crate::error::{ControlError, ControlResult};
use crate::sampled::SamplePeriod;

/// Input callback: one measurement of the process variable.
pub type InputFn = Box<dyn FnMut() -> ControlResult<f64> + Send>;

/// Output callback: apply one actuator value.
pub type OutputFn = Box<dyn FnMut(f64) -> ControlResult<()> + Send>;

/// Static regulator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub limit: Limit,
    pub gains: PidGains,
    pub period: SamplePeriod,
    #[serde(default)]
    pub invert: bool,
}

/// Consistent copy of the controller state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulatorSnapshot {
    pub target: f64,
    pub output_value: f64,
    pub integral: f64,
    pub previous_input: f64,
    pub period: SamplePeriod,
    pub steps: u64,
}

struct LoopCore {
    state: PidState,
    input: InputFn,
    output: OutputFn,
}

impl LoopCore {
    fn step(&mut self) -> ControlResult<()> {
        let input_current = (self.input)()?;
        let step = self.state.update(input_current);
        trace!(
            input = step.input,
            error = step.error,
            p = step.p_term,
            i = step.integral,
            d = step.d_term,
            output = step.output,
            "pid step"
        );
        (self.output)(step.output)
    }

    /// Drive the actuator to the safe value. Errors here are only logged;
    /// the original fault is the one reported.
    fn force_safe(&mut self) {
        let safe = self.state.force_safe_output();
        let output = &mut self.output;
        match panic::catch_unwind(AssertUnwindSafe(|| output(safe))) {
            Ok(Ok(())) => info!(output = safe, "regulator output forced to safe value"),
            Ok(Err(err)) => error!(error = %err, "failed to write safe output"),
            Err(payload) => error!(
                message = %panic_message(payload.as_ref()),
                "safe output write panicked"
            ),
        }
    }
}

struct Shared {
    core: Mutex<LoopCore>,
    running: AtomicBool,
    steps: AtomicU64,
    fault: Mutex<Option<ControlError>>,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, LoopCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_fault(&self, err: ControlError) {
        let mut slot = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// Discrete PID controller driven by its own thread.
pub struct PidRegulator {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PidRegulator {
    /// Build a stopped regulator.
    ///
    /// The input is sampled once here to seed the derivative history.
    /// `initial` seeds the output and integral, clamped to the limit.
    pub fn new(
        config: PidConfig,
        initial: f64,
        target: f64,
        mut input: InputFn,
        output: OutputFn,
    ) -> ControlResult<Self> {
        let first_input = input()?;
        let state = PidState::new(
            config.limit,
            config.gains,
            config.period,
            config.invert,
            initial,
            target,
            first_input,
        );
        debug!(first_input, target, period = config.period.as_secs_f64(), "regulator created");
        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(LoopCore {
                    state,
                    input,
                    output,
                }),
                running: AtomicBool::new(false),
                steps: AtomicU64::new(0),
                fault: Mutex::new(None),
            }),
            handle: None,
        })
    }

    /// Spawn the control thread. No-op while already running.
    pub fn start(&mut self) -> ControlResult<()> {
        if self.is_running() {
            return Ok(());
        }
        self.reap();

        let period = self.shared.core().state.period();
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("pid-regulator".to_string())
            .spawn(move || control_loop(shared, period))
            .map_err(|err| {
                self.shared.running.store(false, Ordering::Release);
                ControlError::Spawn {
                    message: err.to_string(),
                }
            })?;
        self.handle = Some(handle);
        info!(period = period.as_secs_f64(), "regulator started");
        Ok(())
    }

    /// Request the loop to end and wait for the thread. No-op when stopped.
    ///
    /// A step already in progress completes first.
    pub fn stop(&mut self) {
        let was_running = self.shared.running.swap(false, Ordering::AcqRel);
        if let Some(handle) = self.handle.as_ref() {
            handle.thread().unpark();
        }
        self.reap();
        if was_running {
            info!("regulator stopped");
        }
    }

    /// True while the control thread is alive and has not faulted.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Take the recorded fault, if the loop terminated on one.
    pub fn take_fault(&self) -> Option<ControlError> {
        self.shared
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn has_fault(&self) -> bool {
        self.shared
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Hold the controller lock for a multi-value read.
    ///
    /// The control thread blocks while the guard is alive; keep it short.
    pub fn lock(&self) -> PidGuard<'_> {
        PidGuard {
            core: self.shared.core(),
        }
    }

    pub fn set_target(&self, target: f64) {
        self.shared.core().state.set_target(target);
    }

    pub fn target(&self) -> f64 {
        self.shared.core().state.target()
    }

    pub fn output_value(&self) -> f64 {
        self.shared.core().state.output_value()
    }

    pub fn snapshot(&self) -> RegulatorSnapshot {
        let steps = self.shared.steps.load(Ordering::Acquire);
        let core = self.shared.core();
        let state = &core.state;
        RegulatorSnapshot {
            target: state.target(),
            output_value: state.output_value(),
            integral: state.integral(),
            previous_input: state.previous_input(),
            period: state.period(),
            steps,
        }
    }

    /// Replace the tuning.
    pub fn set_parameters(&self, gains: PidGains) {
        self.shared.core().state.set_parameters(gains);
    }

    pub fn set_limit(&self, limit: Limit) {
        self.shared.core().state.set_limit(limit);
    }

    /// Change the sampling period.
    ///
    /// The loop is stopped for the change and restarted afterwards if it
    /// was running.
    pub fn set_period(&mut self, period: SamplePeriod) -> ControlResult<()> {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        self.shared.core().state.rescale_period(period);
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Join a finished thread, converting an escaped panic into a fault.
    fn reap(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(payload) = handle.join()
        {
            let message = panic_message(payload.as_ref());
            error!(%message, "regulator thread panicked");
            self.shared.record_fault(ControlError::Panic { message });
        }
    }
}

impl Drop for PidRegulator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lock on the regulator state, see [`PidRegulator::lock`].
pub struct PidGuard<'a> {
    core: MutexGuard<'a, LoopCore>,
}

impl PidGuard<'_> {
    pub fn target(&self) -> f64 {
        self.core.state.target()
    }

    pub fn output_value(&self) -> f64 {
        self.core.state.output_value()
    }

    pub fn integral(&self) -> f64 {
        self.core.state.integral()
    }

    pub fn previous_input(&self) -> f64 {
        self.core.state.previous_input()
    }

    pub fn state(&self) -> &PidState {
        &self.core.state
    }
}

fn control_loop(shared: Arc<Shared>, period: SamplePeriod) {
    while shared.running.load(Ordering::Acquire) {
        let started = Instant::now();

        let result = {
            let mut core = shared.core();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| core.step()))
                .unwrap_or_else(|payload| {
                    Err(ControlError::Panic {
                        message: panic_message(payload.as_ref()),
                    })
                });
            if outcome.is_err() {
                core.force_safe();
            }
            outcome
        };

        if let Err(err) = result {
            error!(error = %err, "control step failed, regulator halted");
            shared.record_fault(err);
            shared.running.store(false, Ordering::Release);
            return;
        }
        shared.steps.fetch_add(1, Ordering::AcqRel);

        if period.remaining_after(started.elapsed()).is_some() {
            let deadline = started + period.as_duration();
            while shared.running.load(Ordering::Acquire) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HardwareError;
    use std::time::Duration;

    fn config(period: f64) -> PidConfig {
        PidConfig {
            limit: Limit::new(0.0, 5.0).unwrap(),
            gains: PidGains::new(1.0, 0.05, 0.5),
            period: SamplePeriod::new(period).unwrap(),
            invert: false,
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn runs_and_stops() {
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outputs);
        let mut reg = PidRegulator::new(
            config(0.002),
            0.0,
            55.0,
            Box::new(|| Ok(50.0)),
            Box::new(move |v| {
                sink.lock().unwrap().push(v);
                Ok(())
            }),
        )
        .unwrap();

        assert!(!reg.is_running());
        reg.start().unwrap();
        reg.start().unwrap();
        assert!(reg.is_running());
        assert!(wait_for(|| reg.snapshot().steps >= 10));
        reg.stop();
        reg.stop();
        assert!(!reg.is_running());

        let outputs = outputs.lock().unwrap();
        assert!(outputs.iter().all(|v| (0.0..=5.0).contains(v)));
        assert_eq!(reg.output_value(), 5.0);
        assert!(reg.take_fault().is_none());
    }

    #[test]
    fn input_failure_forces_safe_output_and_records_fault() {
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outputs);
        let mut reads = 0;
        let mut reg = PidRegulator::new(
            PidConfig {
                limit: Limit::new(1.0, 5.0).unwrap(),
                ..config(0.001)
            },
            0.0,
            55.0,
            Box::new(move || {
                reads += 1;
                if reads > 4 {
                    Err(ControlError::SensorExhausted {
                        attempts: 3,
                        source: HardwareError::Timeout {
                            device: "probe".into(),
                        },
                    })
                } else {
                    Ok(50.0)
                }
            }),
            Box::new(move |v| {
                sink.lock().unwrap().push(v);
                Ok(())
            }),
        )
        .unwrap();

        reg.start().unwrap();
        assert!(wait_for(|| !reg.is_running()));
        assert!(reg.has_fault());
        assert!(matches!(
            reg.take_fault(),
            Some(ControlError::SensorExhausted { .. })
        ));
        assert!(reg.take_fault().is_none());
        assert_eq!(outputs.lock().unwrap().last().copied(), Some(1.0));
        assert_eq!(reg.output_value(), 1.0);
    }

    #[test]
    fn panicking_output_is_caught() {
        let mut calls = 0;
        let mut reg = PidRegulator::new(
            config(0.001),
            0.0,
            10.0,
            Box::new(|| Ok(0.0)),
            Box::new(move |_| {
                calls += 1;
                if calls == 3 {
                    panic!("supply went away");
                }
                Ok(())
            }),
        )
        .unwrap();
        reg.start().unwrap();
        assert!(wait_for(|| !reg.is_running()));
        match reg.take_fault() {
            Some(ControlError::Panic { message }) => assert!(message.contains("supply went away")),
            other => panic!("unexpected fault {other:?}"),
        }
        // mutex is still usable after the panic
        assert_eq!(reg.lock().target(), 10.0);
    }

    #[test]
    fn lock_blocks_control_step() {
        let mut reg = PidRegulator::new(
            config(0.001),
            0.0,
            55.0,
            Box::new(|| Ok(50.0)),
            Box::new(|_| Ok(())),
        )
        .unwrap();
        reg.start().unwrap();
        assert!(wait_for(|| reg.snapshot().steps > 0));
        {
            let guard = reg.lock();
            let before = reg.shared.steps.load(Ordering::Acquire);
            thread::sleep(Duration::from_millis(20));
            let after = reg.shared.steps.load(Ordering::Acquire);
            // at most the step that was already past the lock can finish
            assert!(after <= before + 1);
            assert_eq!(guard.target(), 55.0);
        }
        reg.stop();
    }

    #[test]
    fn period_change_restarts_loop() {
        let mut reg = PidRegulator::new(
            config(0.002),
            0.0,
            1.0,
            Box::new(|| Ok(0.0)),
            Box::new(|_| Ok(())),
        )
        .unwrap();
        let before = reg.lock().state().scaled_gains();
        reg.start().unwrap();
        reg.set_period(SamplePeriod::new(0.004).unwrap()).unwrap();
        assert!(reg.is_running());
        let after = reg.lock().state().scaled_gains();
        assert!((after.1 - before.1 * 2.0).abs() < 1e-12);
        assert!((after.2 - before.2 / 2.0).abs() < 1e-12);
        reg.stop();

        reg.set_period(SamplePeriod::new(0.001).unwrap()).unwrap();
        assert!(!reg.is_running());
    }

    #[test]
    fn construction_fails_when_first_read_fails() {
        let result = PidRegulator::new(
            config(1.0),
            0.0,
            0.0,
            Box::new(|| {
                Err(ControlError::InvalidArg {
                    what: "no sensor",
                })
            }),
            Box::new(|_| Ok(())),
        );
        assert!(result.is_err());
    }
}
