//! Records handed to the inventory/registration store.
//!
//! The store itself is external; these are the shapes it receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssetTag, DeviceId, EquipmentId, HubId};

/// Registration of a freshly provisioned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub device_id: DeviceId,
    pub equipment_id: EquipmentId,
    pub asset_tag: AssetTag,
    pub hub_id: HubId,
    /// SHA-256 of the certificate PEM (hex).
    pub fingerprint: String,
    pub certificate_pem: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The CA's public certificate as uploaded to a trust store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustAnchorRecord {
    /// SHA-256 of the certificate PEM (hex).
    pub fingerprint: String,
    pub certificate_pem: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Outcome of registering a trust anchor.
///
/// Registering the same CA twice is a normal outcome of re-running
/// provisioning and is reported as `AlreadyPresent`, not as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRegistration {
    Created,
    AlreadyPresent,
}

impl AnchorRegistration {
    /// Whether a new record was written.
    pub fn is_created(self) -> bool {
        matches!(self, Self::Created)
    }
}
