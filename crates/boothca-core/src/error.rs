//! Core domain errors.

use thiserror::Error;

/// Rejected identity input.
///
/// Every variant names the field so the operator can be told which value to fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Value is shorter or longer than allowed.
    #[error("{field} must be between {min} and {max} characters, got {actual}")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    /// Value contains a character outside the allowed set.
    #[error("{field} contains invalid character {ch:?} (allowed: {allowed})")]
    InvalidCharacter {
        field: &'static str,
        ch: char,
        allowed: &'static str,
    },

    /// Value starts or ends with a hyphen.
    #[error("{field} must not start or end with '-'")]
    EdgeHyphen { field: &'static str },
}

impl IdentityError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Length { field, .. }
            | Self::InvalidCharacter { field, .. }
            | Self::EdgeHyphen { field } => field,
        }
    }
}
