//! In-memory artifact store.
//!
//! Used by tests and by embedders that persist artifacts elsewhere.
//! Data is lost on drop.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{ArtifactStore, Sensitivity};

/// In-memory artifact store that counts writes.
#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    artifacts: RwLock<HashMap<String, (Vec<u8>, Sensitivity)>>,
    failing: RwLock<HashSet<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store. `root` is only used to build locations.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            artifacts: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Sensitivity `name` was last written with.
    pub fn sensitivity(&self, name: &str) -> Option<Sensitivity> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|(_, sensitivity)| *sensitivity)
    }

    /// Names currently stored, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Make every future write to `name` fail.
    pub fn fail_writes_to(&self, name: impl Into<String>) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl ArtifactStore for MemoryStore {
    fn location(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        Ok(self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name))
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{name} not found")))
    }

    fn write(&self, name: &str, contents: &[u8], sensitivity: Sensitivity) -> io::Result<()> {
        if self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
        {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("writes to {name} are disabled"),
            ));
        }

        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), (contents.to_vec(), sensitivity));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}
