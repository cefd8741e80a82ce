//! Resource identifiers
//!
//! Every persisted resource id is `<prefix>_<base58 random>`, e.g.
//! `key_3ZbXq2oYxw1Ug6Ei`.

use rand::RngCore;

/// Random bytes behind every generated id
const ID_ENTROPY_BYTES: usize = 12;

/// Kinds of resources that carry a generated id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Key,
    Api,
    Workspace,
    RatelimitNamespace,
    RatelimitOverride,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Api => "api",
            Self::Workspace => "ws",
            Self::RatelimitNamespace => "rlns",
            Self::RatelimitOverride => "rlor",
        }
    }
}

/// Generates a new id for the given resource kind
pub fn new_id(prefix: IdPrefix) -> String {
    let mut bytes = [0u8; ID_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}_{}", prefix.as_str(), bs58::encode(bytes).into_string())
}

/// Checks that `id` looks like an id of the given kind
pub fn is_valid_id(prefix: IdPrefix, id: &str) -> bool {
    match id.split_once('_') {
        Some((p, rest)) => {
            p == prefix.as_str()
                && !rest.is_empty()
                && rest.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
