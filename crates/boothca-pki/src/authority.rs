//! Root certificate authority lifecycle.
//!
//! The CA is created once, lazily, and never regenerated. Its presence is
//! decided by the certificate artifact alone, which is therefore written last:
//! a bootstrap that dies half-way leaves no certificate and simply runs again.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use boothca_core::TrustAnchorRecord;
use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use tracing::{debug, info};

use crate::config::Config;
use crate::crypto::{self, keys, x509, Passphrase};
use crate::error::ProvisionError;
use crate::storage::{ArtifactStore, FsStore, Sensitivity};

/// CA validity from the moment of bootstrap.
pub const AUTHORITY_VALIDITY_DAYS: i64 = 3650;

pub const CA_COMMON_NAME: &str = "Booth Fleet Root CA";
pub const CA_ORGANIZATION: &str = "Booth Fleet";
pub const CA_ORGANIZATIONAL_UNIT: &str = "Device Provisioning";

const CA_CERT: &str = "ca.crt";
const CA_KEY: &str = "ca.key";
const CA_PASS: &str = "ca.pass";

/// Result of [`AuthorityManager::ensure_authority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityStatus {
    /// CA certificate (PEM).
    pub certificate_pem: String,

    /// True when this call created the CA.
    pub is_new: bool,
}

/// Metadata of the stored CA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityInfo {
    /// SHA-256 of the certificate PEM bytes (hex).
    pub fingerprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Subject DN in RFC 4514 form.
    pub subject: String,
    /// Serial number (hex).
    pub serial: String,
}

/// CA signing material, loaded fresh for each issuance.
pub(crate) struct AuthoritySigner {
    pub(crate) certificate: Certificate,
    pub(crate) key_pair: KeyPair,
}

/// Owns the root CA: existence check, one-time bootstrap, metadata.
#[derive(Debug)]
pub struct AuthorityManager {
    store: Arc<dyn ArtifactStore>,
    key_bits: usize,
}

impl AuthorityManager {
    /// Manager backed by the filesystem at `config.authority_dir`.
    pub fn new(config: &Config) -> Self {
        Self::with_store(
            Arc::new(FsStore::new(&config.authority_dir)),
            config.authority_key_bits,
        )
    }

    /// Manager backed by an arbitrary artifact store.
    pub fn with_store(store: Arc<dyn ArtifactStore>, key_bits: usize) -> Self {
        Self { store, key_bits }
    }

    /// Return the CA certificate, creating the CA first if none exists.
    ///
    /// Once a CA exists this performs no writes and always returns the same
    /// certificate.
    pub fn ensure_authority(&self) -> Result<AuthorityStatus, ProvisionError> {
        if self.exists(CA_CERT)? {
            self.require_key_material()?;
            let certificate_pem = self.read_certificate()?;
            debug!(path = %self.certificate_path().display(), "Using existing certificate authority");
            return Ok(AuthorityStatus {
                certificate_pem,
                is_new: false,
            });
        }

        self.bootstrap()
    }

    /// Fingerprint, validity window, subject and serial of the stored CA.
    pub fn authority_info(&self) -> Result<AuthorityInfo, ProvisionError> {
        let pem = self.read_certificate()?;
        let der = x509::pem_to_der(&pem, "decode CA certificate")?;
        let cert = x509::parse_certificate(&der, "parse CA certificate")?;
        let validity = cert.validity();

        Ok(AuthorityInfo {
            fingerprint: crypto::fingerprint(pem.as_bytes()),
            not_before: x509::asn1_to_chrono(&validity.not_before),
            not_after: x509::asn1_to_chrono(&validity.not_after),
            subject: cert.subject().to_string(),
            serial: hex::encode(cert.raw_serial()),
        })
    }

    /// Where the CA certificate lives (or will live).
    pub fn certificate_path(&self) -> PathBuf {
        self.store.location(CA_CERT)
    }

    /// Raw PEM of the CA certificate.
    pub fn read_certificate(&self) -> Result<String, ProvisionError> {
        if !self.exists(CA_CERT)? {
            return Err(ProvisionError::AuthorityNotBootstrapped);
        }
        self.read_text(CA_CERT, "read CA certificate")
    }

    /// Record describing the CA for upload to a trust store.
    pub fn trust_anchor_record(&self) -> Result<TrustAnchorRecord, ProvisionError> {
        let info = self.authority_info()?;
        Ok(TrustAnchorRecord {
            fingerprint: info.fingerprint,
            certificate_pem: self.read_certificate()?,
            not_before: info.not_before,
            not_after: info.not_after,
        })
    }

    /// Load and decrypt the CA signing material.
    pub(crate) fn signer(&self) -> Result<AuthoritySigner, ProvisionError> {
        if !self.exists(CA_CERT)? {
            return Err(ProvisionError::AuthorityNotBootstrapped);
        }
        self.require_key_material()?;

        let cert_pem = self.read_text(CA_CERT, "read CA certificate")?;
        let passphrase = Passphrase::from_stored(self.read(CA_PASS, "read CA passphrase")?)?;
        let key_pem = self.read_text(CA_KEY, "read CA private key")?;
        let key = keys::from_encrypted_pem(&key_pem, &passphrase)?;

        let der = x509::pem_to_der(&cert_pem, "decode CA certificate")?;
        let parsed = x509::parse_certificate(&der, "parse CA certificate")?;
        if keys::public_from_spki(parsed.public_key().raw)? != key.to_public_key() {
            return Err(ProvisionError::crypto(
                "load CA private key",
                "private key does not match the CA certificate",
            ));
        }

        let key_pair = keys::signing_key(&key)?;
        let params = CertificateParams::from_ca_cert_pem(&cert_pem)
            .map_err(|e| keys::rcgen_error("load CA certificate", e))?;
        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| keys::rcgen_error("load CA certificate", e))?;

        Ok(AuthoritySigner {
            certificate,
            key_pair,
        })
    }

    fn bootstrap(&self) -> Result<AuthorityStatus, ProvisionError> {
        info!(key_bits = self.key_bits, "Bootstrapping certificate authority");

        let passphrase = Passphrase::generate()?;
        let key = keys::generate(self.key_bits, "generate CA key")?;
        let key_pair = keys::signing_key(&key)?;
        let encrypted_key = keys::to_encrypted_pem(&key, &passphrase)?;

        let (not_before, not_after) = x509::validity_window(AUTHORITY_VALIDITY_DAYS)?;
        let mut params = authority_params();
        params.not_before = not_before;
        params.not_after = not_after;
        params.serial_number = Some(SerialNumber::from_slice(&crypto::random_serial()?));

        let certificate_pem = params
            .self_signed(&key_pair)
            .map_err(|e| keys::rcgen_error("self-sign CA certificate", e))?
            .pem();

        // Everything must read back before anything is committed.
        if keys::from_encrypted_pem(&encrypted_key, &passphrase)? != key {
            return Err(ProvisionError::crypto(
                "encrypt CA private key",
                "encrypted key does not decrypt to the generated key",
            ));
        }
        let der = x509::pem_to_der(&certificate_pem, "decode CA certificate")?;
        x509::parse_certificate(&der, "parse CA certificate")?;

        self.write(CA_PASS, &passphrase.to_stored(), Sensitivity::Secret, "write CA passphrase")?;
        self.write(CA_KEY, encrypted_key.as_bytes(), Sensitivity::Secret, "write CA private key")?;
        self.write(CA_CERT, certificate_pem.as_bytes(), Sensitivity::Public, "write CA certificate")?;

        info!(
            path = %self.certificate_path().display(),
            fingerprint = %crypto::fingerprint(certificate_pem.as_bytes()),
            not_after = %x509::to_chrono(not_after),
            "Certificate authority created"
        );

        Ok(AuthorityStatus {
            certificate_pem,
            is_new: true,
        })
    }

    fn require_key_material(&self) -> Result<(), ProvisionError> {
        for name in [CA_KEY, CA_PASS] {
            if !self.exists(name)? {
                return Err(ProvisionError::IncompleteAuthority {
                    missing: self.store.location(name),
                });
            }
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool, ProvisionError> {
        self.store
            .exists(name)
            .map_err(|e| ProvisionError::storage("check authority storage", self.store.location(name), e))
    }

    fn read(&self, name: &str, stage: &'static str) -> Result<Vec<u8>, ProvisionError> {
        self.store
            .read(name)
            .map_err(|e| ProvisionError::storage(stage, self.store.location(name), e))
    }

    fn read_text(&self, name: &str, stage: &'static str) -> Result<String, ProvisionError> {
        String::from_utf8(self.read(name, stage)?).map_err(|e| {
            ProvisionError::storage(
                stage,
                self.store.location(name),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })
    }

    fn write(
        &self,
        name: &str,
        contents: &[u8],
        sensitivity: Sensitivity,
        stage: &'static str,
    ) -> Result<(), ProvisionError> {
        self.store
            .write(name, contents, sensitivity)
            .map_err(|e| ProvisionError::storage(stage, self.store.location(name), e))
    }
}

/// Fixed subject and CA extensions of the root certificate.
fn authority_params() -> CertificateParams {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, CA_COMMON_NAME);
    dn.push(DnType::OrganizationName, CA_ORGANIZATION);
    dn.push(DnType::OrganizationalUnitName, CA_ORGANIZATIONAL_UNIT);
    params.distinguished_name = dn;

    // Signs device leaves only.
    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    params
}
