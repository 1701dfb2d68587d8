//! Provisioning configuration.

use std::path::{Path, PathBuf};

/// Provisioning configuration.
///
/// Passed explicitly to both components; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the CA certificate, encrypted key and passphrase.
    pub authority_dir: PathBuf,

    /// Directory receiving per-device keys and certificates.
    pub device_dir: PathBuf,

    /// RSA modulus size of the CA key.
    pub authority_key_bits: usize,

    /// RSA modulus size of device keys.
    pub device_key_bits: usize,

    /// DNS suffix appended to the asset tag in the DNS SAN claim.
    pub dns_suffix: String,

    /// Re-issue for an asset tag that already has a certificate on disk.
    pub replace_existing_devices: bool,
}

impl Config {
    /// Config with both storage roots placed under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            authority_dir: root.join("authority"),
            device_dir: root.join("devices"),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authority_dir: PathBuf::from("certs/authority"),
            device_dir: PathBuf::from("certs/devices"),
            authority_key_bits: 4096,
            device_key_bits: 2048,
            dns_suffix: "booth.internal".to_string(),
            replace_existing_devices: false,
        }
    }
}
