//! Key/blob persistence for resumable run state.
//!
//! A missing key is not an error: `load` returns `None` and the caller
//! starts fresh.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::types::VersionedState;
use crate::{ResultsError, ResultsResult};

/// Durable key/blob storage.
pub trait StateStore: Send + Sync {
    fn save(&self, key: &str, blob: &[u8]) -> ResultsResult<()>;

    fn load(&self, key: &str) -> ResultsResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key succeeds.
    fn delete(&self, key: &str) -> ResultsResult<()>;
}

fn check_key(key: &str) -> ResultsResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ResultsError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// One file per key under a directory, replaced atomically on save.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> ResultsResult<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for FileStore {
    fn save(&self, key: &str, blob: &[u8]) -> ResultsResult<()> {
        check_key(key)?;
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(key, path = %path.display(), "state saved");
        Ok(())
    }

    fn load(&self, key: &str) -> ResultsResult<Option<Vec<u8>>> {
        check_key(key)?;
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, key: &str) -> ResultsResult<()> {
        check_key(key)?;
        match fs::remove_file(self.path(key)) {
            Ok(()) => {
                debug!(key, "state deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process store. Clones share the same contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl StateStore for MemoryStore {
    fn save(&self, key: &str, blob: &[u8]) -> ResultsResult<()> {
        check_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> ResultsResult<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> ResultsResult<()> {
        check_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Serialize `state` under its key.
pub fn save_state<T: VersionedState>(store: &dyn StateStore, state: &T) -> ResultsResult<()> {
    let blob = serde_json::to_vec_pretty(state)?;
    store.save(T::KEY, &blob)
}

/// Load a state blob, rejecting other schema versions.
pub fn load_state<T: VersionedState>(store: &dyn StateStore) -> ResultsResult<Option<T>> {
    let Some(blob) = store.load(T::KEY)? else {
        return Ok(None);
    };
    let state: T = serde_json::from_slice(&blob)?;
    if state.version() != T::VERSION {
        return Err(ResultsError::VersionMismatch {
            key: T::KEY.to_string(),
            found: state.version(),
            expected: T::VERSION,
        });
    }
    Ok(Some(state))
}

pub fn delete_state<T: VersionedState>(store: &dyn StateStore) -> ResultsResult<()> {
    store.delete(T::KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoopState, SweepState};

    #[test]
    fn missing_state_is_none() {
        let store = MemoryStore::new();
        assert!(load_state::<LoopState>(&store).unwrap().is_none());
        delete_state::<LoopState>(&store).unwrap();
    }

    #[test]
    fn typed_roundtrip() {
        let store = MemoryStore::new();
        save_state(&store, &SweepState::new(35.0, -2.5)).unwrap();
        let loaded: SweepState = load_state(&store).unwrap().unwrap();
        assert_eq!(loaded.target, 35.0);
        assert_eq!(loaded.step, -2.5);
        assert!(store.contains("sweep_state"));
    }

    #[test]
    fn other_version_rejected() {
        let store = MemoryStore::new();
        store
            .save("loop_state", br#"{"version": 7, "remaining_loops": 3}"#)
            .unwrap();
        let err = load_state::<LoopState>(&store).unwrap_err();
        assert!(matches!(
            err,
            ResultsError::VersionMismatch {
                found: 7,
                expected: 1,
                ..
            }
        ));
    }

    #[test]
    fn keys_are_restricted() {
        let store = MemoryStore::new();
        assert!(store.save("../escape", b"x").is_err());
        assert!(store.save("", b"x").is_err());
    }

    #[test]
    fn clones_share_contents() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.save("k", b"v").unwrap();
        assert_eq!(b.load("k").unwrap(), Some(b"v".to_vec()));
    }
}
