//! Key domain
//!
//! Keys are opaque secrets stored only as digests. Each key belongs to an
//! api and may carry a remaining-uses counter that verification spends.

mod entity;
mod repository;
mod validation;

pub use entity::{
    Api, ConsumeOutcome, DeleteOutcome, Key, KeyMeta, RemainingUpdate, VerificationCode,
    VerificationError, VerifiedKey,
};
pub use repository::KeyRepository;
pub use validation::{
    validate_byte_length, validate_prefix, validate_remaining, KeyValidationError,
    MAX_BYTE_LENGTH, MAX_PREFIX_LENGTH, PREFIX_SEPARATOR,
};

#[cfg(test)]
pub use repository::mock::UnavailableKeyRepository;
