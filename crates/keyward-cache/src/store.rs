//! Persistence seam for the cache snapshot
//!
//! A store is opened, used and closed inside each call; no handle is held
//! between loop iterations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use keyward_core::{KeywardError, KeywardResult};

/// Where the persisted snapshot lives
pub trait CacheStore: Send {
    /// Persisted contents, `None` if nothing was ever written
    fn read(&self) -> KeywardResult<Option<String>>;

    /// Replace the persisted contents wholesale
    fn write(&mut self, contents: &str) -> KeywardResult<()>;
}

/// Snapshot file on the local filesystem
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut staged = self.path.clone().into_os_string();
        staged.push(".tmp");
        PathBuf::from(staged)
    }
}

impl CacheStore for FileStore {
    fn read(&self) -> KeywardResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeywardError::StorageFailure(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&mut self, contents: &str) -> KeywardResult<()> {
        // Readers only ever see the old or the new document.
        let staged = self.staging_path();
        std::fs::write(&staged, contents)
            .and_then(|()| std::fs::rename(&staged, &self.path))
            .map_err(|e| KeywardError::StorageFailure(format!("{}: {e}", self.path.display())))
    }
}

/// In-memory store. Clones share the same contents, so a test can keep a
/// handle while the cache owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreState>>,
}

#[derive(Default)]
struct MemoryStoreState {
    contents: Option<String>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        let store = Self::default();
        store.inner.lock().contents = Some(contents.into());
        store
    }

    pub fn contents(&self) -> Option<String> {
        self.inner.lock().contents.clone()
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    /// Make subsequent writes fail with a storage error
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl CacheStore for MemoryStore {
    fn read(&self) -> KeywardResult<Option<String>> {
        Ok(self.inner.lock().contents.clone())
    }

    fn write(&mut self, contents: &str) -> KeywardResult<()> {
        let mut state = self.inner.lock();
        if state.fail_writes {
            return Err(KeywardError::StorageFailure("memory store write refused".into()));
        }
        state.contents = Some(contents.to_string());
        state.writes += 1;
        Ok(())
    }
}
