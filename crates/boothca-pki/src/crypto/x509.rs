//! X.509 parsing helpers and validity arithmetic.

use chrono::{DateTime, Utc};
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

use crate::error::ProvisionError;

/// Decode a single PEM block to DER.
pub(crate) fn pem_to_der(pem_str: &str, stage: &'static str) -> Result<Vec<u8>, ProvisionError> {
    let pem = ::pem::parse(pem_str).map_err(|e| ProvisionError::crypto(stage, e))?;
    Ok(pem.into_contents())
}

/// Parse a DER certificate, borrowing from `der`.
pub(crate) fn parse_certificate<'a>(
    der: &'a [u8],
    stage: &'static str,
) -> Result<X509Certificate<'a>, ProvisionError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| ProvisionError::crypto(stage, e))
}

/// Validity window of `days` starting now, truncated to whole seconds.
pub(crate) fn validity_window(
    days: i64,
) -> Result<(OffsetDateTime, OffsetDateTime), ProvisionError> {
    let now = OffsetDateTime::from_unix_timestamp(Utc::now().timestamp())
        .map_err(|e| ProvisionError::crypto("compute validity window", e))?;
    Ok((now, now + ::time::Duration::days(days)))
}

pub(crate) fn to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), 0).unwrap_or_default()
}

pub(crate) fn asn1_to_chrono(t: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or_default()
}
