//! Bench application layer.
//!
//! Ties regulation, acquisition and persistence into an experiment run and
//! gives the command line a small service surface.

pub mod bench;
pub mod capture;
pub mod compile;
pub mod error;
pub mod experiment;
pub mod interrupt;
pub mod notify;
pub mod orchestrator;
pub mod postprocess;
pub mod progress;
pub mod record;
pub mod service;

pub use bench::{Bench, BenchOptions, SimHandles, assemble};
pub use capture::{CaptureContext, CaptureMode, ConditionsCapture, ScopeCapture, read_conditions};
pub use compile::{CAPTURE_KINDS, EXPERIMENT_KINDS, POST_PROCESSOR_KINDS, post_processor_from_name};
pub use error::{AppError, AppResult};
pub use experiment::{Experiment, TemperatureHold, TemperatureSweep};
pub use interrupt::{Decision, FixedAnswer, InterruptFlag, OperatorPrompt};
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use orchestrator::{Orchestrator, RunPhase, RunSettings, RunSummary};
pub use postprocess::{ClipAudit, PostProcessor, WaveformStats};
pub use progress::{ProgressCallback, ProgressEvent, RunStage};
pub use record::{CaptureBin, ChannelAverage, ConditionReading, ExperimentState};
pub use service::{
    PersistedStatus, list_runs, load_config, open_record_store, open_state_store,
    persisted_status, reset_state,
};
