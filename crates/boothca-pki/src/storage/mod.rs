//! Artifact storage abstraction.
//!
//! Keys, certificates and the CA passphrase are written through an
//! [`ArtifactStore`] so a stricter deployment can swap the plain filesystem for
//! an encrypted or hardware-backed sink without touching issuance logic.

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use std::fmt::Debug;
use std::io;
use std::path::PathBuf;

/// How an artifact must be protected at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Certificates. World-readable is fine.
    Public,
    /// Private keys and passphrases. Owner-only access.
    Secret,
}

/// A flat, path-addressable namespace of named artifacts.
pub trait ArtifactStore: Send + Sync + Debug {
    /// Durable location of `name`, whether or not it exists yet.
    fn location(&self, name: &str) -> PathBuf;

    /// Whether `name` has been written.
    fn exists(&self, name: &str) -> io::Result<bool>;

    /// Read the full contents of `name`.
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;

    /// Replace `name` atomically: readers see either the old or the new
    /// contents, never a partial write.
    fn write(&self, name: &str, contents: &[u8], sensitivity: Sensitivity) -> io::Result<()>;

    /// Delete `name`. Removing a missing artifact is not an error.
    fn remove(&self, name: &str) -> io::Result<()>;
}
