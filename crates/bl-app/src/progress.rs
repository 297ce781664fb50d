use std::time::Duration;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Starting,
    Stepping,
    Stabilizing,
    Capturing,
    PostProcessing,
    Saving,
    IterationDone,
    Completed,
    ShuttingDown,
}

impl RunStage {
    pub fn label(self) -> &'static str {
        match self {
            RunStage::Starting => "Starting",
            RunStage::Stepping => "Stepping",
            RunStage::Stabilizing => "Stabilizing",
            RunStage::Capturing => "Capturing",
            RunStage::PostProcessing => "Post-processing",
            RunStage::Saving => "Saving",
            RunStage::IterationDone => "Iteration done",
            RunStage::Completed => "Completed",
            RunStage::ShuttingDown => "Shutting down",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: RunStage,
    /// Zero-based index of the iteration within this invocation.
    pub loop_index: u64,
    /// Iterations left, `None` when unbounded.
    pub remaining: Option<u64>,
    pub target: Option<f64>,
    pub elapsed_wall_s: f64,
    pub average_iteration: Option<Duration>,
    pub eta: Option<DateTime<Local>>,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn stage(stage: RunStage, loop_index: u64, elapsed_wall_s: f64) -> Self {
        Self {
            stage,
            loop_index,
            remaining: None,
            target: None,
            elapsed_wall_s,
            average_iteration: None,
            eta: None,
            message: None,
        }
    }
}

pub type ProgressCallback = Box<dyn FnMut(ProgressEvent) + Send>;
