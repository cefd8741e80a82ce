//! Key material validation

use thiserror::Error;

use crate::domain::DomainError;

/// Separator between a key's prefix and its random part
pub const PREFIX_SEPARATOR: char = '_';

/// Longest accepted key prefix
pub const MAX_PREFIX_LENGTH: usize = 8;

/// Largest accepted amount of key entropy
pub const MAX_BYTE_LENGTH: usize = 255;

/// Errors raised while validating key creation input
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyValidationError {
    #[error("byteLength must be greater than 0")]
    ZeroByteLength,

    #[error("byteLength must not exceed {0}")]
    ByteLengthTooLarge(usize),

    #[error("prefix cannot be empty")]
    EmptyPrefix,

    #[error("prefix exceeds maximum length of {0} characters")]
    PrefixTooLong(usize),

    #[error("prefix must not contain the separator '{0}'")]
    PrefixContainsSeparator(char),

    #[error("prefix contains invalid character: '{0}'")]
    InvalidPrefixCharacter(char),

    #[error("remaining must not be negative")]
    NegativeRemaining,
}

impl From<KeyValidationError> for DomainError {
    fn from(err: KeyValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}

pub fn validate_byte_length(byte_length: usize) -> Result<(), KeyValidationError> {
    if byte_length == 0 {
        return Err(KeyValidationError::ZeroByteLength);
    }

    if byte_length > MAX_BYTE_LENGTH {
        return Err(KeyValidationError::ByteLengthTooLarge(MAX_BYTE_LENGTH));
    }

    Ok(())
}

/// Validate a key prefix
///
/// Rules:
/// - Cannot be empty
/// - Maximum 8 characters
/// - Must not contain the `_` separator
/// - Only ASCII alphanumeric characters
pub fn validate_prefix(prefix: &str) -> Result<(), KeyValidationError> {
    if prefix.is_empty() {
        return Err(KeyValidationError::EmptyPrefix);
    }

    if prefix.contains(PREFIX_SEPARATOR) {
        return Err(KeyValidationError::PrefixContainsSeparator(PREFIX_SEPARATOR));
    }

    if prefix.chars().count() > MAX_PREFIX_LENGTH {
        return Err(KeyValidationError::PrefixTooLong(MAX_PREFIX_LENGTH));
    }

    if let Some(c) = prefix.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(KeyValidationError::InvalidPrefixCharacter(c));
    }

    Ok(())
}

pub fn validate_remaining(remaining: Option<i64>) -> Result<(), KeyValidationError> {
    match remaining {
        Some(n) if n < 0 => Err(KeyValidationError::NegativeRemaining),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_length_bounds() {
        assert_eq!(validate_byte_length(0), Err(KeyValidationError::ZeroByteLength));
        assert!(validate_byte_length(1).is_ok());
        assert!(validate_byte_length(255).is_ok());
        assert_eq!(
            validate_byte_length(256),
            Err(KeyValidationError::ByteLengthTooLarge(255))
        );
    }

    #[test]
    fn test_valid_prefixes() {
        assert!(validate_prefix("sk").is_ok());
        assert!(validate_prefix("prod2024").is_ok());
    }

    #[test]
    fn test_prefix_with_separator_rejected() {
        assert_eq!(
            validate_prefix("sk_live"),
            Err(KeyValidationError::PrefixContainsSeparator('_'))
        );
    }

    #[test]
    fn test_invalid_prefixes() {
        assert_eq!(validate_prefix(""), Err(KeyValidationError::EmptyPrefix));
        assert_eq!(
            validate_prefix("waytoolong"),
            Err(KeyValidationError::PrefixTooLong(8))
        );
        assert_eq!(
            validate_prefix("a-b"),
            Err(KeyValidationError::InvalidPrefixCharacter('-'))
        );
    }

    #[test]
    fn test_remaining() {
        assert!(validate_remaining(None).is_ok());
        assert!(validate_remaining(Some(0)).is_ok());
        assert_eq!(
            validate_remaining(Some(-1)),
            Err(KeyValidationError::NegativeRemaining)
        );
    }

    #[test]
    fn test_into_domain_error() {
        let err: DomainError = KeyValidationError::ZeroByteLength.into();
        assert!(matches!(err, DomainError::Validation { .. }));
    }
}
