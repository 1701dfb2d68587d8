//! Filesystem artifact store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{ArtifactStore, Sensitivity};

/// Stores each artifact as a file directly under `root`.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a crash never leaves a truncated artifact behind.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsStore {
    fn location(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        match fs::metadata(self.location(name)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.location(name))
    }

    fn write(&self, name: &str, contents: &[u8], sensitivity: Sensitivity) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        set_mode(tmp.as_file(), sensitivity)?;

        let target = self.location(name);
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!(path = %target.display(), ?sensitivity, "Artifact written");
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.location(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn set_mode(file: &fs::File, sensitivity: Sensitivity) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match sensitivity {
        Sensitivity::Secret => 0o600,
        Sensitivity::Public => 0o644,
    };
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _sensitivity: Sensitivity) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_root_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("nested/authority"));

        assert!(!store.exists("ca.crt").unwrap());
        store.write("ca.crt", b"first", Sensitivity::Public).unwrap();
        store.write("ca.crt", b"second", Sensitivity::Public).unwrap();

        assert!(store.exists("ca.crt").unwrap());
        assert_eq!(store.read("ca.crt").unwrap(), b"second");

        // Only the artifact itself remains; temp files were renamed away.
        let entries: Vec<_> = fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.write("ca.pass", b"secret\n", Sensitivity::Secret).unwrap();
        store.write("ca.crt", b"cert", Sensitivity::Public).unwrap();

        let mode = |name: &str| fs::metadata(store.location(name)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("ca.pass"), 0o600);
        assert_eq!(mode("ca.crt"), 0o644);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.remove("nothing.key").unwrap();
    }
}
