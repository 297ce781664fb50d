//! Configuration and persisted-state operations behind the CLI commands.

use std::path::Path;

use bl_config::BenchConfig;
use bl_results::{
    FileStore, LoopState, RecordStore, RunManifest, StateStore, SweepState, delete_state,
    load_state,
};

use crate::error::AppResult;

pub fn load_config(path: &Path) -> AppResult<BenchConfig> {
    Ok(bl_config::load_path(path)?)
}

pub fn open_state_store(config: &BenchConfig) -> AppResult<FileStore> {
    Ok(FileStore::new(&config.run.state_dir)?)
}

pub fn open_record_store(config: &BenchConfig) -> AppResult<RecordStore> {
    Ok(RecordStore::new(&config.run.result_dir)?)
}

/// What a resumed run would pick up.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedStatus {
    pub loop_state: Option<LoopState>,
    pub sweep: Option<SweepState>,
}

impl PersistedStatus {
    pub fn is_empty(&self) -> bool {
        self.loop_state.is_none() && self.sweep.is_none()
    }
}

pub fn persisted_status(store: &dyn StateStore) -> AppResult<PersistedStatus> {
    Ok(PersistedStatus {
        loop_state: load_state(store)?,
        sweep: load_state(store)?,
    })
}

/// Forget any interrupted run so the next one starts fresh.
pub fn reset_state(store: &dyn StateStore) -> AppResult<()> {
    delete_state::<LoopState>(store)?;
    delete_state::<SweepState>(store)?;
    Ok(())
}

pub fn list_runs(config: &BenchConfig) -> AppResult<Vec<RunManifest>> {
    Ok(open_record_store(config)?.list_runs()?)
}
