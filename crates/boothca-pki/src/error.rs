//! Provisioning errors.

use std::fmt;
use std::io;
use std::path::PathBuf;

use boothca_core::IdentityError;
use thiserror::Error;

/// Errors surfaced by the authority manager and issuance engine.
///
/// Each variant records the stage that failed so the operator-facing message
/// can say exactly what went wrong.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required cryptographic facility is unavailable.
    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// Filesystem (or other artifact store) failure.
    #[error("failed to {stage} ({}): {source}", path.display())]
    Storage {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// CA certificate exists but its key material does not.
    #[error("certificate authority is incomplete: {} is missing", missing.display())]
    IncompleteAuthority { missing: PathBuf },

    /// Issuance attempted before the CA was created.
    #[error("certificate authority has not been bootstrapped")]
    AuthorityNotBootstrapped,

    /// Key generation, signing, encryption or decryption failed.
    #[error("failed to {stage}: {message}")]
    Crypto { stage: &'static str, message: String },

    /// Identity input would produce an invalid SAN.
    #[error("invalid identity input: {0}")]
    InvalidIdentity(#[from] IdentityError),

    /// Device already has a certificate and replacement is disabled.
    #[error("asset tag '{asset_tag}' already has a certificate at {}", location.display())]
    DeviceAlreadyIssued { asset_tag: String, location: PathBuf },
}

impl ProvisionError {
    pub(crate) fn storage(stage: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            stage,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn crypto(stage: &'static str, err: impl fmt::Display) -> Self {
        Self::Crypto {
            stage,
            message: err.to_string(),
        }
    }

    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PrerequisiteMissing(_) => ErrorKind::PrerequisiteMissing,
            Self::Storage { .. }
            | Self::IncompleteAuthority { .. }
            | Self::DeviceAlreadyIssued { .. } => ErrorKind::StorageError,
            Self::AuthorityNotBootstrapped => ErrorKind::AuthorityNotBootstrapped,
            Self::Crypto { .. } => ErrorKind::CryptoOperationFailed,
            Self::InvalidIdentity(_) => ErrorKind::InvalidIdentityInput,
        }
    }
}

/// Error categories reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PrerequisiteMissing,
    StorageError,
    AuthorityNotBootstrapped,
    CryptoOperationFailed,
    InvalidIdentityInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrerequisiteMissing => "prerequisite missing",
            Self::StorageError => "storage error",
            Self::AuthorityNotBootstrapped => "authority not bootstrapped",
            Self::CryptoOperationFailed => "crypto operation failed",
            Self::InvalidIdentityInput => "invalid identity input",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ProvisionError::IncompleteAuthority {
            missing: PathBuf::from("ca.key"),
        };
        assert_eq!(err.kind(), ErrorKind::StorageError);

        let err = ProvisionError::crypto("decrypt CA private key", "bad padding");
        assert_eq!(err.kind(), ErrorKind::CryptoOperationFailed);
        assert_eq!(err.to_string(), "failed to decrypt CA private key: bad padding");

        // Valid input colliding with stored state is not an identity problem.
        let err = ProvisionError::DeviceAlreadyIssued {
            asset_tag: "PB-005".to_string(),
            location: PathBuf::from("/srv/devices/pb-005.crt"),
        };
        assert_eq!(err.kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_storage_message_names_stage_and_path() {
        let err = ProvisionError::storage(
            "write CA passphrase",
            "/srv/ca/ca.pass",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("failed to write CA passphrase (/srv/ca/ca.pass)"));
    }
}
