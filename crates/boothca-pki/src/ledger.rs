//! Local registration ledger.
//!
//! Append-only JSON lines standing in for the external inventory store: the
//! CLI records trust anchors and device registrations here so they can be
//! forwarded or audited later.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use boothca_core::{AnchorRegistration, DeviceRegistration, TrustAnchorRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while reading or appending to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access ledger {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt ledger entry at {}:{line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode ledger entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One line of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    TrustAnchor(TrustAnchorRecord),
    Device(DeviceRegistration),
}

/// JSON-lines ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Ledger at `path`. The file is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a CA as a trust anchor.
    ///
    /// A CA with the same fingerprint already on record is reported as
    /// [`AnchorRegistration::AlreadyPresent`] and nothing is written.
    pub fn register_trust_anchor(
        &self,
        record: &TrustAnchorRecord,
    ) -> Result<AnchorRegistration, LedgerError> {
        let duplicate = self.entries()?.iter().any(|entry| {
            matches!(entry, LedgerEntry::TrustAnchor(existing) if existing.fingerprint == record.fingerprint)
        });
        if duplicate {
            debug!(fingerprint = %record.fingerprint, "Trust anchor already registered");
            return Ok(AnchorRegistration::AlreadyPresent);
        }

        self.append(&LedgerEntry::TrustAnchor(record.clone()))?;
        info!(fingerprint = %record.fingerprint, "Trust anchor registered");
        Ok(AnchorRegistration::Created)
    }

    /// Append a device registration.
    pub fn record_device(&self, registration: &DeviceRegistration) -> Result<(), LedgerError> {
        self.append(&LedgerEntry::Device(registration.clone()))?;
        info!(
            device_id = %registration.device_id,
            asset_tag = %registration.asset_tag,
            "Device registration recorded"
        );
        Ok(())
    }

    /// All entries in append order. A missing file is an empty ledger.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|source| LedgerError::Parse {
                    path: self.path.clone(),
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }

    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let io_err = |source: io::Error| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boothca_core::{AssetTag, DeviceId, EquipmentId, HubId};
    use chrono::Utc;

    fn anchor(fingerprint: &str) -> TrustAnchorRecord {
        TrustAnchorRecord {
            fingerprint: fingerprint.to_string(),
            certificate_pem: "-----BEGIN CERTIFICATE-----\n".to_string(),
            not_before: Utc::now(),
            not_after: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_anchor_is_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("state/ledger.jsonl"));

        assert_eq!(
            ledger.register_trust_anchor(&anchor("aa")).unwrap(),
            AnchorRegistration::Created
        );
        assert_eq!(
            ledger.register_trust_anchor(&anchor("aa")).unwrap(),
            AnchorRegistration::AlreadyPresent
        );
        assert_eq!(
            ledger.register_trust_anchor(&anchor("bb")).unwrap(),
            AnchorRegistration::Created
        );
        assert_eq!(ledger.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_device_entries_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.jsonl"));
        let registration = DeviceRegistration {
            device_id: DeviceId::generate(),
            equipment_id: EquipmentId::from(42),
            asset_tag: AssetTag::parse("PB-005").unwrap(),
            hub_id: HubId::parse("hub-1").unwrap(),
            fingerprint: "cc".repeat(32),
            certificate_pem: "pem".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        };

        ledger.record_device(&registration).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries, vec![LedgerEntry::Device(registration)]);
    }

    #[test]
    fn test_corrupt_line_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        fs::write(&path, "{\"kind\":\"trust_anchor\"}\nnot json\n").unwrap();

        let err = Ledger::open(&path).entries().unwrap_err();
        assert!(matches!(err, LedgerError::Parse { line: 1, .. }));
    }
}
