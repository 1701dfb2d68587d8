//! BoothCA PKI Library
//!
//! Provisions cryptographic identities for booth devices:
//!
//! - [`AuthorityManager`] bootstraps the single root CA once and exposes its
//!   certificate and metadata.
//! - [`IssuanceEngine`] mints one CA-signed client certificate per device, bound
//!   to the device/equipment/hub identity through SAN claims.
//!
//! All operations are synchronous and may block on RSA key generation and file
//! I/O; async callers should run them on a blocking pool.

pub mod authority;
pub mod config;
pub mod crypto;
pub mod error;
pub mod issuance;
pub mod ledger;
pub mod storage;

pub use authority::{AuthorityInfo, AuthorityManager, AuthorityStatus};
pub use config::Config;
pub use crypto::fingerprint;
pub use error::{ErrorKind, ProvisionError};
pub use issuance::{IssuanceEngine, IssuedDevice};
pub use ledger::{Ledger, LedgerEntry, LedgerError};
pub use storage::{ArtifactStore, FsStore, MemoryStore, Sensitivity};
