//! BoothCA Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Cryptography
//! - Filesystem or network
//! - Runtime specifics
//!
//! Everything here describes the identity of a booth device and the records
//! handed to the inventory store once a device has been provisioned.

pub mod error;
pub mod identity;
pub mod ids;
pub mod record;

// Re-export commonly used types
pub use error::IdentityError;
pub use identity::DeviceIdentity;
pub use ids::{AssetTag, DeviceId, EquipmentId, HubId};
pub use record::{AnchorRegistration, DeviceRegistration, TrustAnchorRecord};
