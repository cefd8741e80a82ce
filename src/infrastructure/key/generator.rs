//! Key material generation
//!
//! Secrets are `[prefix_]base58(random bytes)`. Only the digest,
//! `base64(sha256(utf8(secret)))`, is ever stored.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::key::{
    validate_byte_length, validate_prefix, KeyValidationError, PREFIX_SEPARATOR,
};

/// Default amount of entropy for new keys
pub const DEFAULT_BYTE_LENGTH: usize = 16;

/// Characters of the random part kept visible in `start`
const START_VISIBLE_CHARS: usize = 4;

/// Result of generating a new key
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// The full secret (only returned once at creation)
    pub key: String,
    /// Visible beginning of the secret for display
    pub start: String,
    /// Digest used for storage and lookup
    pub hash: String,
}

/// Generates a new secret with `byte_length` random bytes
pub fn generate(byte_length: usize, prefix: Option<&str>) -> Result<GeneratedKey, KeyValidationError> {
    validate_byte_length(byte_length)?;
    if let Some(prefix) = prefix {
        validate_prefix(prefix)?;
    }

    let mut random_bytes = vec![0u8; byte_length];
    rand::thread_rng().fill_bytes(&mut random_bytes);

    let encoded = bs58::encode(&random_bytes).into_string();
    let key = match prefix {
        Some(prefix) => format!("{}{}{}", prefix, PREFIX_SEPARATOR, encoded),
        None => encoded,
    };

    Ok(GeneratedKey {
        start: start_of(&key),
        hash: digest(&key),
        key,
    })
}

/// Digest of a secret: base64 of its SHA-256
pub fn digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Prefix (with separator) plus the first characters of the random part
pub fn start_of(secret: &str) -> String {
    let (head, random) = match secret.split_once(PREFIX_SEPARATOR) {
        Some((prefix, rest)) => (&secret[..prefix.len() + 1], rest),
        None => ("", secret),
    };

    let visible: String = random.chars().take(START_VISIBLE_CHARS).collect();
    format!("{}{}", head, visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_with_prefix() {
        let generated = generate(16, Some("sk")).unwrap();

        assert!(generated.key.starts_with("sk_"));
        assert_eq!(generated.start.len(), "sk_".len() + 4);
        assert!(generated.key.starts_with(&generated.start));
    }

    #[test]
    fn test_generate_without_prefix() {
        let generated = generate(16, None).unwrap();

        assert!(!generated.key.contains('_'));
        assert_eq!(generated.start.len(), 4);
    }

    #[test]
    fn test_random_part_is_base58() {
        let generated = generate(32, Some("pk")).unwrap();
        let random = generated.key.trim_start_matches("pk_");

        let decoded = bs58::decode(random).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_generate_rejects_bad_input() {
        assert_eq!(generate(0, None).unwrap_err(), KeyValidationError::ZeroByteLength);
        assert_eq!(
            generate(16, Some("sk_live")).unwrap_err(),
            KeyValidationError::PrefixContainsSeparator('_')
        );
    }

    #[test]
    fn test_digest_is_deterministic() {
        let generated = generate(16, Some("sk")).unwrap();

        assert_eq!(digest(&generated.key), digest(&generated.key));
        assert_eq!(digest(&generated.key), generated.hash);
    }

    #[test]
    fn test_digest_format() {
        // sha256("hello"), base64 with padding
        assert_eq!(digest("hello"), "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=");
    }

    #[test]
    fn test_no_collisions_across_many_keys() {
        let mut keys = HashSet::new();
        let mut hashes = HashSet::new();

        for _ in 0..10_000 {
            let generated = generate(DEFAULT_BYTE_LENGTH, None).unwrap();
            assert!(keys.insert(generated.key));
            assert!(hashes.insert(generated.hash));
        }
    }
}
