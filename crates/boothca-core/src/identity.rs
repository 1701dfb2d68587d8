//! The caller-supplied half of a device identity.

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::ids::{AssetTag, DeviceId, EquipmentId, HubId};

/// Identity tuple supplied by the orchestrator for one issuance.
///
/// The device id is deliberately absent: it is generated during issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub asset_tag: AssetTag,
    pub hub_id: HubId,
    pub equipment_id: EquipmentId,
}

impl DeviceIdentity {
    /// Build an identity from already validated parts.
    pub fn new(asset_tag: AssetTag, hub_id: HubId, equipment_id: EquipmentId) -> Self {
        Self {
            asset_tag,
            hub_id,
            equipment_id,
        }
    }

    /// Validate raw operator input.
    pub fn parse(asset_tag: &str, hub_id: &str, equipment_id: &str) -> Result<Self, IdentityError> {
        Ok(Self {
            asset_tag: AssetTag::parse(asset_tag)?,
            hub_id: HubId::parse(hub_id)?,
            equipment_id: EquipmentId::parse(equipment_id)?,
        })
    }

    /// `urn:device:<deviceId>`
    pub fn device_urn(device_id: &DeviceId) -> String {
        format!("urn:device:{}", device_id)
    }

    /// `urn:equipment:<equipmentId>`
    pub fn equipment_urn(&self) -> String {
        format!("urn:equipment:{}", self.equipment_id)
    }

    /// `urn:hub:<hubId>`
    pub fn hub_urn(&self) -> String {
        format!("urn:hub:{}", self.hub_id)
    }

    /// `<assetTag>.<suffix>`, e.g. `PB-005.booth.internal`.
    pub fn dns_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.asset_tag, suffix.trim_start_matches('.'))
    }
}
