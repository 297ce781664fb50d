//! Experiment main loop.
//!
//! Each iteration steps the experiment, lets the temperature settle, makes
//! sure the control thread is still alive, captures, post-processes, appends
//! the record and persists the remaining budget. Whatever way the loop ends,
//! the regulator gets exactly one supervised stop.

use std::time::Instant;

use bl_controls::TemperatureRegulator;
use bl_core::{CaptureId, LoopTimer, format_hms, run_id_for};
use bl_results::{
    LoopState, RecordStore, RunManifest, StateStore, delete_state, load_state, save_state,
};
use chrono::Local;
use tracing::{error, info, warn};

use crate::capture::{CaptureContext, CaptureMode};
use crate::error::{AppError, AppResult};
use crate::experiment::Experiment;
use crate::interrupt::{
    Decision, FixedAnswer, InterruptFlag, OperatorPrompt, check_interrupt, wait_interruptible,
};
use crate::notify::{LogNotifier, Notifier, notify_best_effort};
use crate::postprocess::{PostProcessor, run_chain};
use crate::progress::{ProgressCallback, ProgressEvent, RunStage};
use crate::record::ExperimentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Faulted,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Budget used when no persisted state exists. `None` is unbounded.
    pub max_loops: Option<u64>,
    pub key_resolution: f64,
    /// Stored with the loop state to flag resumes under another config.
    pub config_hash: Option<String>,
    /// Record directory name; derived from the start time when absent.
    pub run_id: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_loops: None,
            key_resolution: 1.0,
            config_hash: None,
            run_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub iterations: u64,
    pub remaining: Option<u64>,
    /// Budget came from persisted state rather than the settings.
    pub resumed: bool,
}

pub struct Orchestrator {
    regulator: TemperatureRegulator,
    experiment: Box<dyn Experiment>,
    capture: Box<dyn CaptureMode>,
    post: Vec<Box<dyn PostProcessor>>,
    state: Box<dyn StateStore>,
    records: Option<RecordStore>,
    notifier: Box<dyn Notifier>,
    prompt: Box<dyn OperatorPrompt>,
    interrupt: InterruptFlag,
    progress: Option<ProgressCallback>,
    settings: RunSettings,
    run_id: String,
    phase: RunPhase,
    outcome: Option<RunPhase>,
    timer: LoopTimer,
    started: Instant,
    iterations: u64,
    remaining: Option<u64>,
    resumed: bool,
    regulator_stopped: bool,
}

impl Orchestrator {
    pub fn new(
        regulator: TemperatureRegulator,
        experiment: Box<dyn Experiment>,
        capture: Box<dyn CaptureMode>,
        state: Box<dyn StateStore>,
        settings: RunSettings,
    ) -> Self {
        let run_id = settings
            .run_id
            .clone()
            .unwrap_or_else(|| run_id_for(Local::now()));
        Self {
            regulator,
            experiment,
            capture,
            post: Vec::new(),
            state,
            records: None,
            notifier: Box::new(LogNotifier),
            prompt: Box::new(FixedAnswer(Decision::Abort)),
            interrupt: InterruptFlag::new(),
            progress: None,
            remaining: settings.max_loops,
            settings,
            run_id,
            phase: RunPhase::Idle,
            outcome: None,
            timer: LoopTimer::new(),
            started: Instant::now(),
            iterations: 0,
            resumed: false,
            regulator_stopped: false,
        }
    }

    pub fn with_post_processors(mut self, post: Vec<Box<dyn PostProcessor>>) -> Self {
        self.post = post;
        self
    }

    pub fn with_records(mut self, records: RecordStore) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// `Completed` or `Faulted` once a run has ended.
    pub fn outcome(&self) -> Option<RunPhase> {
        self.outcome
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Ask a running loop to end at its next check point. Persisted state
    /// is kept so the next run resumes.
    pub fn request_stop(&self) {
        self.interrupt.request_stop();
    }

    pub fn regulator(&self) -> &TemperatureRegulator {
        &self.regulator
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            iterations: self.iterations,
            remaining: self.remaining,
            resumed: self.resumed,
        }
    }

    /// Run the loop to completion or failure, then shut down.
    ///
    /// An orchestrator runs once; a second call is rejected.
    pub fn run(&mut self) -> AppResult<RunSummary> {
        if self.phase != RunPhase::Idle {
            return Err(AppError::InvalidInput(
                "orchestrator has already run".to_string(),
            ));
        }
        self.phase = RunPhase::Running;
        self.started = Instant::now();
        notify_best_effort(
            self.notifier.as_ref(),
            &format!(
                "{} with {} capture started ({})",
                self.experiment.name(),
                self.capture.name(),
                self.run_id
            ),
            "Experiment started",
        );

        let result = self.run_loop();
        self.phase = if result.is_ok() {
            RunPhase::Completed
        } else {
            RunPhase::Faulted
        };
        self.outcome = Some(self.phase);

        self.emit(
            RunStage::ShuttingDown,
            None,
            Some("stopping regulator".to_string()),
        );
        let shutdown = self.stop();
        self.phase = RunPhase::Stopped;

        if let Err(err) = &shutdown {
            error!(error = %err, "regulator shutdown failed");
            notify_best_effort(
                self.notifier.as_ref(),
                &format!("Regulator shutdown failed: {err}"),
                "Shutdown failed",
            );
        }

        match result {
            Ok(()) => {
                shutdown?;
                let summary = self.summary();
                notify_best_effort(
                    self.notifier.as_ref(),
                    &format!(
                        "{} finished after {} iteration(s)",
                        summary.run_id, summary.iterations
                    ),
                    "Experiment completed",
                );
                Ok(summary)
            }
            Err(err) => {
                error!(error = %err, iterations = self.iterations, "experiment failed");
                let title = match &err {
                    AppError::Interrupted => "Experiment interrupted",
                    AppError::StopRequested => "Experiment stopped",
                    _ => "Experiment failed",
                };
                notify_best_effort(
                    self.notifier.as_ref(),
                    &format!(
                        "{} stopped after {} iteration(s): {err}",
                        self.run_id, self.iterations
                    ),
                    title,
                );
                Err(err)
            }
        }
    }

    /// Supervised regulator stop. Later calls do nothing.
    pub fn stop(&mut self) -> AppResult<()> {
        if self.regulator_stopped {
            return Ok(());
        }
        self.regulator_stopped = true;
        let report = self.regulator.stop()?;
        if report.ramped() {
            info!(
                steps = report.targets.len(),
                final_reading = ?report.final_reading,
                "regulator ramped down before stop"
            );
        }
        Ok(())
    }

    fn run_loop(&mut self) -> AppResult<()> {
        let mut remaining = match load_state::<LoopState>(self.state.as_ref())? {
            Some(saved) => {
                if let (Some(saved_hash), Some(hash)) =
                    (&saved.config_hash, &self.settings.config_hash)
                    && saved_hash != hash
                {
                    warn!("configuration changed since the persisted state was written");
                }
                info!(remaining = ?saved.remaining_loops, "resuming persisted loop budget");
                self.resumed = true;
                saved.remaining_loops
            }
            None => self.settings.max_loops,
        };
        self.remaining = remaining;

        self.experiment.restore(self.state.as_ref())?;
        self.regulator.start()?;

        if let Some(records) = &self.records {
            let mut manifest = RunManifest::new(
                self.run_id.clone(),
                Local::now(),
                self.experiment.name(),
                self.capture.name(),
                self.settings.config_hash.clone().unwrap_or_default(),
            );
            manifest.post_processors = self.post.iter().map(|p| p.name().to_string()).collect();
            records.create_run(&manifest)?;
        }
        self.emit(
            RunStage::Starting,
            None,
            Some(format!("run {}", self.run_id)),
        );

        let mut loop_index = 0u64;
        while remaining != Some(0) {
            let iteration_started = Instant::now();
            check_interrupt(&self.interrupt, self.prompt.as_mut())?;

            let capture_id = CaptureId::generate();
            self.emit(RunStage::Stepping, None, None);
            let target = self.experiment.step(self.state.as_ref())?;
            self.regulator.set_target(target);
            info!(loop_index, target, %capture_id, "iteration started");

            self.emit(RunStage::Stabilizing, Some(target), None);
            wait_interruptible(
                self.experiment.stabilize_time(),
                &self.interrupt,
                self.prompt.as_mut(),
            )?;
            self.ensure_regulating()?;

            let mut record = ExperimentState::new(capture_id, loop_index, target);
            self.emit(RunStage::Capturing, Some(target), None);
            let ctx = CaptureContext {
                regulator: &self.regulator,
                key_resolution: self.settings.key_resolution,
            };
            self.capture.capture(&ctx, &mut record)?;
            self.ensure_regulating()?;

            self.emit(RunStage::PostProcessing, Some(target), None);
            let record = run_chain(&mut self.post, record)?;

            self.emit(RunStage::Saving, Some(target), None);
            if let Some(records) = &self.records {
                records.append(&self.run_id, &record)?;
            }
            remaining = remaining.map(|n| n.saturating_sub(1));
            save_state(
                self.state.as_ref(),
                &LoopState::new(remaining, self.settings.config_hash.clone()),
            )?;

            self.timer.record(iteration_started.elapsed());
            loop_index += 1;
            self.iterations = loop_index;
            self.remaining = remaining;

            let average = self.timer.average().map(format_hms);
            match remaining.and_then(|n| self.timer.eta(n, Local::now())) {
                Some(eta) => info!(
                    done = loop_index,
                    ?remaining,
                    average = ?average,
                    eta = %eta.format("%Y-%m-%d %H:%M:%S"),
                    "iteration complete"
                ),
                None => info!(done = loop_index, ?remaining, average = ?average, "iteration complete"),
            }
            self.emit(RunStage::IterationDone, Some(target), None);
        }

        delete_state::<LoopState>(self.state.as_ref())?;
        self.experiment.finish(self.state.as_ref())?;
        self.emit(RunStage::Completed, None, None);
        Ok(())
    }

    fn ensure_regulating(&self) -> AppResult<()> {
        if self.regulator.is_running() {
            return Ok(());
        }
        match self.regulator.take_controller_fault() {
            Some(fault) => Err(AppError::ControllerFault(fault)),
            None => Err(AppError::RegulatorStopped),
        }
    }

    fn emit(&mut self, stage: RunStage, target: Option<f64>, message: Option<String>) {
        let Some(callback) = self.progress.as_mut() else {
            return;
        };
        let mut event = ProgressEvent::stage(
            stage,
            self.iterations,
            self.started.elapsed().as_secs_f64(),
        );
        event.remaining = self.remaining;
        event.target = target;
        event.average_iteration = self.timer.average();
        event.eta = self
            .remaining
            .and_then(|n| self.timer.eta(n, Local::now()));
        event.message = message;
        callback(event);
    }
}
