//! Device certificate issuance.
//!
//! Each call generates a device id and a key pair, builds a CSR in memory, and
//! has the CA sign it under a fixed client-auth leaf policy.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use boothca_core::{DeviceId, DeviceIdentity, DeviceRegistration, EquipmentId};
use chrono::{DateTime, Utc};
use rcgen::{
    CertificateParams, CertificateSigningRequest, CertificateSigningRequestParams,
    DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use tracing::{info, warn};

use crate::authority::AuthorityManager;
use crate::config::Config;
use crate::crypto::{self, keys, x509};
use crate::error::ProvisionError;
use crate::storage::{ArtifactStore, FsStore, Sensitivity};

/// Device certificate validity from the moment of signing.
pub const DEVICE_VALIDITY_DAYS: i64 = 3650;

/// A freshly issued device certificate and its key.
#[derive(Clone)]
pub struct IssuedDevice {
    pub device_id: DeviceId,
    pub equipment_id: EquipmentId,
    /// SHA-256 of the certificate PEM bytes (hex).
    pub fingerprint: String,
    pub certificate_pem: String,
    /// Unencrypted PKCS#8 PEM, meant to be sealed into the device runtime.
    pub private_key_pem: String,
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Serial number (hex).
    pub serial: String,
}

impl IssuedDevice {
    /// Registration record for the inventory store.
    pub fn registration(&self, identity: &DeviceIdentity) -> DeviceRegistration {
        DeviceRegistration {
            device_id: self.device_id.clone(),
            equipment_id: self.equipment_id.clone(),
            asset_tag: identity.asset_tag.clone(),
            hub_id: identity.hub_id.clone(),
            fingerprint: self.fingerprint.clone(),
            certificate_pem: self.certificate_pem.clone(),
            issued_at: self.not_before,
            expires_at: self.not_after,
        }
    }
}

impl fmt::Debug for IssuedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedDevice")
            .field("device_id", &self.device_id)
            .field("equipment_id", &self.equipment_id)
            .field("fingerprint", &self.fingerprint)
            .field("certificate_path", &self.certificate_path)
            .field("private_key_path", &self.private_key_path)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Mints one CA-signed client certificate per call.
#[derive(Debug)]
pub struct IssuanceEngine {
    authority: Arc<AuthorityManager>,
    store: Arc<dyn ArtifactStore>,
    key_bits: usize,
    dns_suffix: String,
    replace_existing: bool,

    /// Serializes issuance so device writes never interleave.
    lock: Mutex<()>,
}

impl IssuanceEngine {
    /// Engine writing device artifacts to `config.device_dir`.
    pub fn new(config: &Config, authority: Arc<AuthorityManager>) -> Self {
        Self::with_store(
            config,
            authority,
            Arc::new(FsStore::new(&config.device_dir)),
        )
    }

    /// Engine writing device artifacts to an arbitrary store.
    pub fn with_store(
        config: &Config,
        authority: Arc<AuthorityManager>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            authority,
            store,
            key_bits: config.device_key_bits,
            dns_suffix: config.dns_suffix.clone(),
            replace_existing: config.replace_existing_devices,
            lock: Mutex::new(()),
        }
    }

    /// Validate raw identifiers, then issue.
    pub fn issue(
        &self,
        asset_tag: &str,
        hub_id: &str,
        equipment_id: &str,
    ) -> Result<IssuedDevice, ProvisionError> {
        let identity = DeviceIdentity::parse(asset_tag, hub_id, equipment_id)?;
        self.issue_device_certificate(&identity)
    }

    /// Issue a certificate for `identity` and persist key and certificate.
    ///
    /// Fails without touching device storage if the CA is missing or cannot be
    /// decrypted. On a storage failure the asset tag's artifacts are rolled back
    /// to what they were before the call: removed for a new device, or the
    /// previous key restored when replacing.
    pub fn issue_device_certificate(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<IssuedDevice, ProvisionError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stem = identity.asset_tag.artifact_stem();
        let cert_name = format!("{stem}.crt");
        let key_name = format!("{stem}.key");

        let signer = self.authority.signer()?;

        let already_issued = self.store.exists(&cert_name).map_err(|e| {
            ProvisionError::storage("check device storage", self.store.location(&cert_name), e)
        })?;
        if already_issued && !self.replace_existing {
            return Err(ProvisionError::DeviceAlreadyIssued {
                asset_tag: identity.asset_tag.to_string(),
                location: self.store.location(&cert_name),
            });
        }

        let device_id = DeviceId::generate();
        let key = keys::generate(self.key_bits, "generate device key")?;
        let key_pair = keys::signing_key(&key)?;
        let private_key_pem = keys::to_pem(&key)?;

        let request = self.signing_request(&device_id, identity, &key_pair)?;
        let mut csr = CertificateSigningRequestParams::from_der(request.der())
            .map_err(|e| keys::rcgen_error("parse signing request", e))?;
        drop(request);

        let (not_before, not_after) = x509::validity_window(DEVICE_VALIDITY_DAYS)?;
        let serial = crypto::random_serial()?;
        apply_leaf_policy(&mut csr.params);
        csr.params.not_before = not_before;
        csr.params.not_after = not_after;
        csr.params.serial_number = Some(SerialNumber::from_slice(&serial));

        let certificate_pem = csr
            .signed_by(&signer.certificate, &signer.key_pair)
            .map_err(|e| keys::rcgen_error("sign device certificate", e))?
            .pem();
        let fingerprint = crypto::fingerprint(certificate_pem.as_bytes());

        self.persist(&key_name, &cert_name, &private_key_pem, &certificate_pem)?;

        info!(
            device_id = %device_id,
            asset_tag = %identity.asset_tag,
            hub_id = %identity.hub_id,
            equipment_id = %identity.equipment_id,
            fingerprint = %fingerprint,
            "Device certificate issued"
        );

        Ok(IssuedDevice {
            device_id,
            equipment_id: identity.equipment_id.clone(),
            fingerprint,
            certificate_pem,
            private_key_pem,
            certificate_path: self.store.location(&cert_name),
            private_key_path: self.store.location(&key_name),
            not_before: x509::to_chrono(not_before),
            not_after: x509::to_chrono(not_after),
            serial: hex::encode(serial),
        })
    }

    /// CSR with CN = device id and the SANs in fixed order.
    fn signing_request(
        &self,
        device_id: &DeviceId,
        identity: &DeviceIdentity,
        key_pair: &KeyPair,
    ) -> Result<CertificateSigningRequest, ProvisionError> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, device_id.as_str());
        params.distinguished_name = dn;

        params.subject_alt_names = vec![
            SanType::URI(ia5(DeviceIdentity::device_urn(device_id))?),
            SanType::URI(ia5(identity.equipment_urn())?),
            SanType::URI(ia5(identity.hub_urn())?),
            SanType::DnsName(ia5(identity.dns_name(&self.dns_suffix))?),
        ];

        params
            .serialize_request(key_pair)
            .map_err(|e| keys::rcgen_error("build signing request", e))
    }

    fn persist(
        &self,
        key_name: &str,
        cert_name: &str,
        private_key_pem: &str,
        certificate_pem: &str,
    ) -> Result<(), ProvisionError> {
        let previous_key = self.previous_key(key_name)?;

        self.store
            .write(key_name, private_key_pem.as_bytes(), Sensitivity::Secret)
            .map_err(|e| {
                ProvisionError::storage("write device private key", self.store.location(key_name), e)
            })?;

        if let Err(e) = self
            .store
            .write(cert_name, certificate_pem.as_bytes(), Sensitivity::Public)
        {
            let rollback = match &previous_key {
                Some(key) => self.store.write(key_name, key, Sensitivity::Secret),
                None => self.store.remove(key_name),
            };
            if let Err(rollback) = rollback {
                warn!(
                    path = %self.store.location(key_name).display(),
                    error = %rollback,
                    restoring = previous_key.is_some(),
                    "Failed to roll back device key after certificate write failure"
                );
            }
            return Err(ProvisionError::storage(
                "write device certificate",
                self.store.location(cert_name),
                e,
            ));
        }

        Ok(())
    }

    /// Key currently stored under `key_name`, if any.
    fn previous_key(&self, key_name: &str) -> Result<Option<Vec<u8>>, ProvisionError> {
        let location = || self.store.location(key_name);
        let exists = self
            .store
            .exists(key_name)
            .map_err(|e| ProvisionError::storage("check device storage", location(), e))?;
        if !exists {
            return Ok(None);
        }
        self.store
            .read(key_name)
            .map(Some)
            .map_err(|e| ProvisionError::storage("read previous device key", location(), e))
    }
}

/// Non-CA, client-authentication-only leaf.
fn apply_leaf_policy(params: &mut CertificateParams) {
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.use_authority_key_identifier_extension = true;
}

fn ia5(value: String) -> Result<Ia5String, ProvisionError> {
    Ia5String::try_from(value.as_str()).map_err(|e| {
        ProvisionError::crypto("encode subject alternative name", format!("'{value}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use x509_parser::extensions::GeneralName;
    use x509_parser::prelude::*;

    struct Fixture {
        authority: Arc<AuthorityManager>,
        devices: Arc<MemoryStore>,
        engine: IssuanceEngine,
    }

    fn fixture(config: Config) -> Fixture {
        let authority = Arc::new(AuthorityManager::with_store(
            Arc::new(MemoryStore::new("/srv/authority")),
            2048,
        ));
        let devices = Arc::new(MemoryStore::new("/srv/devices"));
        let engine = IssuanceEngine::with_store(&config, authority.clone(), devices.clone());
        Fixture {
            authority,
            devices,
            engine,
        }
    }

    fn sans(pem: &str) -> Vec<String> {
        let der = crate::crypto::x509::pem_to_der(pem, "test").unwrap();
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let san = cert.subject_alternative_name().unwrap().unwrap();
        san.value
            .general_names
            .iter()
            .map(|name| match name {
                GeneralName::URI(uri) => format!("URI:{uri}"),
                GeneralName::DNSName(dns) => format!("DNS:{dns}"),
                other => format!("OTHER:{other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_issue_embeds_identity_claims() {
        let f = fixture(Config::default());
        f.authority.ensure_authority().unwrap();

        let issued = f.engine.issue("PB-005", "hub-1", "42").unwrap();
        assert_eq!(
            sans(&issued.certificate_pem),
            vec![
                format!("URI:urn:device:{}", issued.device_id),
                "URI:urn:equipment:42".to_string(),
                "URI:urn:hub:hub-1".to_string(),
                "DNS:PB-005.booth.internal".to_string(),
            ]
        );
        assert_eq!(issued.equipment_id.as_str(), "42");
        assert_eq!(issued.certificate_path, PathBuf::from("/srv/devices/pb-005.crt"));
        assert_eq!(issued.private_key_path, PathBuf::from("/srv/devices/pb-005.key"));
        assert_eq!(f.devices.sensitivity("pb-005.key"), Some(Sensitivity::Secret));
    }

    #[test]
    fn test_custom_dns_suffix() {
        let f = fixture(Config {
            dns_suffix: "kiosk.example".to_string(),
            ..Config::default()
        });
        f.authority.ensure_authority().unwrap();

        let issued = f.engine.issue("PB-006", "hub-1", "7").unwrap();
        assert_eq!(sans(&issued.certificate_pem)[3], "DNS:PB-006.kiosk.example");
    }

    #[test]
    fn test_issue_without_authority() {
        let f = fixture(Config::default());
        let err = f.engine.issue("PB-005", "hub-1", "42").unwrap_err();
        assert!(matches!(err, ProvisionError::AuthorityNotBootstrapped));
        assert!(f.devices.names().is_empty());
    }

    #[test]
    fn test_invalid_identity_rejected_before_signing() {
        let f = fixture(Config::default());
        let err = f.engine.issue("PB 005", "hub-1", "42").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidIdentityInput);
        assert!(f.devices.names().is_empty());
    }

    #[test]
    fn test_refuses_to_overwrite_device() {
        let f = fixture(Config::default());
        f.authority.ensure_authority().unwrap();
        let first = f.engine.issue("PB-005", "hub-1", "42").unwrap();

        let err = f.engine.issue("PB-005", "hub-1", "42").unwrap_err();
        assert!(matches!(err, ProvisionError::DeviceAlreadyIssued { .. }));

        let stored = f.devices.read("pb-005.crt").unwrap();
        assert_eq!(stored, first.certificate_pem.as_bytes());
    }

    #[test]
    fn test_replace_existing_device() {
        let f = fixture(Config {
            replace_existing_devices: true,
            ..Config::default()
        });
        f.authority.ensure_authority().unwrap();
        let first = f.engine.issue("PB-005", "hub-1", "42").unwrap();
        let second = f.engine.issue("PB-005", "hub-1", "42").unwrap();

        assert_ne!(first.device_id, second.device_id);
        assert_eq!(
            f.devices.read("pb-005.crt").unwrap(),
            second.certificate_pem.as_bytes()
        );
    }

    #[test]
    fn test_certificate_write_failure_cleans_up_key() {
        let f = fixture(Config::default());
        f.authority.ensure_authority().unwrap();
        f.devices.fail_writes_to("pb-005.crt");

        let err = f.engine.issue("PB-005", "hub-1", "42").unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Storage {
                stage: "write device certificate",
                ..
            }
        ));
        assert!(f.devices.names().is_empty());
    }

    #[test]
    fn test_failed_replacement_keeps_previous_pair() {
        let f = fixture(Config {
            replace_existing_devices: true,
            ..Config::default()
        });
        f.authority.ensure_authority().unwrap();
        let first = f.engine.issue("PB-005", "hub-1", "42").unwrap();

        f.devices.fail_writes_to("pb-005.crt");
        let err = f.engine.issue("PB-005", "hub-1", "42").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageError);

        assert_eq!(f.devices.names(), vec!["pb-005.crt", "pb-005.key"]);
        assert_eq!(
            f.devices.read("pb-005.key").unwrap(),
            first.private_key_pem.as_bytes()
        );
        assert_eq!(
            f.devices.read("pb-005.crt").unwrap(),
            first.certificate_pem.as_bytes()
        );
        assert_eq!(f.devices.sensitivity("pb-005.key"), Some(Sensitivity::Secret));
    }

    #[test]
    fn test_asset_tag_case_shares_one_slot() {
        let f = fixture(Config::default());
        f.authority.ensure_authority().unwrap();
        let first = f.engine.issue("PB-005", "hub-1", "42").unwrap();

        let err = f.engine.issue("pb-005", "hub-1", "42").unwrap_err();
        assert!(matches!(err, ProvisionError::DeviceAlreadyIssued { .. }));
        assert_eq!(f.devices.names(), vec!["pb-005.crt", "pb-005.key"]);
        assert_eq!(
            f.devices.read("pb-005.crt").unwrap(),
            first.certificate_pem.as_bytes()
        );
    }

    #[test]
    fn test_registration_record() {
        let f = fixture(Config::default());
        f.authority.ensure_authority().unwrap();
        let identity = DeviceIdentity::parse("PB-005", "hub-1", "42").unwrap();
        let issued = f.engine.issue_device_certificate(&identity).unwrap();

        let record = issued.registration(&identity);
        assert_eq!(record.device_id, issued.device_id);
        assert_eq!(record.fingerprint, issued.fingerprint);
        assert_eq!(record.hub_id.as_str(), "hub-1");
        assert_eq!((record.expires_at - record.issued_at).num_days(), DEVICE_VALIDITY_DAYS);
    }

    #[test]
    fn test_debug_hides_private_key() {
        let f = fixture(Config::default());
        f.authority.ensure_authority().unwrap();
        let issued = f.engine.issue("PB-005", "hub-1", "42").unwrap();
        assert!(!format!("{:?}", issued).contains("PRIVATE KEY"));
    }
}
