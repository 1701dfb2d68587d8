//! Cryptographic building blocks shared by the authority and issuance paths.

pub(crate) mod keys;
mod material;
pub(crate) mod x509;

pub use material::{fingerprint, Passphrase};
pub(crate) use material::random_serial;
