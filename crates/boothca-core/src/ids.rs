//! Newtype wrappers for identifiers to ensure type safety.
//!
//! `DeviceId` is generated, never parsed from operator input. The other three
//! identifiers are validated on construction so that every value can be placed
//! into a certificate SAN without escaping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::IdentityError;

/// Characters allowed in URI path segments without percent-encoding (RFC 3986 unreserved).
const URI_SAFE: &str = "A-Z a-z 0-9 - . _ ~";

/// Characters allowed in a DNS label.
const DNS_LABEL: &str = "A-Z a-z 0-9 -";

/// Unique identifier for a provisioned device.
///
/// This is the principal identity baked into the certificate's Common Name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a new random DeviceId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator-assigned label of a booth, e.g. `PB-005`.
///
/// Must form a single DNS label: 3 to 63 ASCII letters, digits or hyphens,
/// not starting or ending with a hyphen. Case is kept as entered for the
/// DNS claim; storage uses [`AssetTag::artifact_stem`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetTag(String);

impl AssetTag {
    /// Minimum accepted length.
    pub const MIN_LEN: usize = 3;
    /// Maximum accepted length (one DNS label).
    pub const MAX_LEN: usize = 63;

    /// Validate and wrap an asset tag.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        const FIELD: &str = "asset tag";
        check_length(FIELD, value, Self::MIN_LEN, Self::MAX_LEN)?;
        if let Some(ch) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(IdentityError::InvalidCharacter {
                field: FIELD,
                ch,
                allowed: DNS_LABEL,
            });
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(IdentityError::EdgeHyphen { field: FIELD });
        }
        Ok(Self(value.to_owned()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used to name stored artifacts.
    ///
    /// DNS names compare case-insensitively, so `PB-005` and `pb-005` must
    /// resolve to the same certificate slot.
    pub fn artifact_stem(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

/// Opaque identifier of the hub (site) a device belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HubId(String);

impl HubId {
    /// Validate and wrap a hub id.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        check_uri_segment("hub id", value)?;
        Ok(Self(value.to_owned()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier assigned by the inventory store before issuance.
///
/// Usually an integer row id, but any URI-safe token is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EquipmentId(String);

impl EquipmentId {
    /// Validate and wrap an equipment id.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        check_uri_segment("equipment id", value)?;
        Ok(Self(value.to_owned()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for EquipmentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Shared trait impls for the validated string newtypes.
macro_rules! validated_string {
    ($($ty:ident),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $ty {
                type Err = IdentityError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::parse(s)
                }
            }

            impl TryFrom<&str> for $ty {
                type Error = IdentityError;

                fn try_from(s: &str) -> Result<Self, Self::Error> {
                    Self::parse(s)
                }
            }

            impl TryFrom<String> for $ty {
                type Error = IdentityError;

                fn try_from(s: String) -> Result<Self, Self::Error> {
                    Self::parse(&s)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.0
                }
            }
        )+
    };
}

validated_string!(AssetTag, HubId, EquipmentId);

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), IdentityError> {
    let actual = value.chars().count();
    if actual < min || actual > max {
        return Err(IdentityError::Length {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn check_uri_segment(field: &'static str, value: &str) -> Result<(), IdentityError> {
    check_length(field, value, 1, 128)?;
    match value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
    {
        Some(ch) => Err(IdentityError::InvalidCharacter {
            field,
            ch,
            allowed: URI_SAFE,
        }),
        None => Ok(()),
    }
}
