//! Random material and digests.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::ProvisionError;

/// Fill a buffer from the operating system's CSPRNG.
fn random_bytes<const N: usize>() -> Result<[u8; N], ProvisionError> {
    let mut bytes = [0u8; N];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        ProvisionError::PrerequisiteMissing(format!("secure random source unavailable: {e}"))
    })?;
    Ok(bytes)
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A fresh 20-byte certificate serial.
///
/// The top bit is cleared so the DER INTEGER stays positive within 20 octets,
/// and bit 6 is set so the leading octet is never zero.
pub(crate) fn random_serial() -> Result<[u8; 20], ProvisionError> {
    let mut serial = random_bytes::<20>()?;
    serial[0] = (serial[0] & 0x7f) | 0x40;
    Ok(serial)
}

/// Passphrase protecting the CA private key at rest.
///
/// 256 random bits rendered as 64 hex characters. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub(crate) fn generate() -> Result<Self, ProvisionError> {
        Ok(Self(hex::encode(random_bytes::<32>()?)))
    }

    /// Parse the contents of a stored passphrase file.
    pub(crate) fn from_stored(bytes: Vec<u8>) -> Result<Self, ProvisionError> {
        let text = String::from_utf8(bytes)
            .map_err(|_| ProvisionError::crypto("load CA passphrase", "passphrase is not UTF-8"))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ProvisionError::crypto(
                "load CA passphrase",
                "passphrase file is empty",
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// File contents for persisting this passphrase.
    pub(crate) fn to_stored(&self) -> Vec<u8> {
        format!("{}\n", self.0).into_bytes()
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}
