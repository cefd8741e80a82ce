//! Key and api entities

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::DomainError;

/// Free-form key metadata
pub type KeyMeta = HashMap<String, Value>;

/// A key space that owns keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Api {
    id: String,
    workspace_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl Api {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Key entity
///
/// The plaintext secret is never part of the entity; `hash` is the base64
/// SHA-256 digest used for lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    id: String,
    api_id: String,
    hash: String,
    /// Visible beginning of the secret, e.g. `sk_3Zb`
    start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    meta: KeyMeta,
    /// `None` means unlimited
    remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
}

impl Key {
    pub fn new(
        id: impl Into<String>,
        api_id: impl Into<String>,
        hash: impl Into<String>,
        start: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            api_id: api_id.into(),
            hash: hash.into(),
            start: start.into(),
            owner_id: None,
            name: None,
            meta: KeyMeta::new(),
            remaining: None,
            expires: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_meta(mut self, meta: KeyMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_remaining(mut self, remaining: Option<i64>) -> Self {
        self.remaining = remaining;
        self
    }

    pub fn with_expires(mut self, expires: Option<DateTime<Utc>>) -> Self {
        self.expires = expires;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_deleted_at(mut self, deleted_at: Option<DateTime<Utc>>) -> Self {
        self.deleted_at = deleted_at;
        self
    }

    // Getters

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn meta(&self) -> &KeyMeta {
        &self.meta
    }

    pub fn remaining(&self) -> Option<i64> {
        self.remaining
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    // State

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires
            .is_some_and(|expires| expires.timestamp_millis() <= now_millis)
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining.is_none()
    }

    /// Marks the key deleted; returns false if it already was
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) -> bool {
        if self.deleted_at.is_some() {
            return false;
        }
        self.deleted_at = Some(at);
        true
    }

    /// Applies a remaining-uses update, never going below zero
    pub fn apply_remaining(&mut self, update: RemainingUpdate) -> Result<Option<i64>, DomainError> {
        if let RemainingUpdate::Increment(delta) | RemainingUpdate::Decrement(delta) = update {
            if delta < 0 {
                return Err(DomainError::validation("value must not be negative"));
            }
        }

        self.remaining = match (update, self.remaining) {
            (RemainingUpdate::Set(value), _) => {
                if value.is_some_and(|v| v < 0) {
                    return Err(DomainError::validation("remaining must not be negative"));
                }
                value
            }
            (RemainingUpdate::Increment(delta), Some(current)) => {
                Some(current.saturating_add(delta))
            }
            (RemainingUpdate::Decrement(delta), Some(current)) => {
                Some(current.saturating_sub(delta).max(0))
            }
            (RemainingUpdate::Increment(_) | RemainingUpdate::Decrement(_), None) => {
                return Err(DomainError::validation(
                    "cannot increment or decrement an unlimited key; use set instead",
                ));
            }
        };

        Ok(self.remaining)
    }
}

/// Change to a key's remaining uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingUpdate {
    /// Replace the value; `None` makes the key unlimited
    Set(Option<i64>),
    Increment(i64),
    /// Saturates at zero
    Decrement(i64),
}

/// Result of an atomic lookup-and-decrement by hash
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// No live key with that hash
    NotFound,
    /// Key has no usage limit; nothing was decremented
    Unlimited(Key),
    /// One use was consumed; the key carries the new remaining value
    Consumed(Key),
    /// Remaining was already zero; nothing was decremented
    Exhausted(Key),
}

/// Result of a soft delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted(Key),
    AlreadyDeleted(Key),
    NotFound,
}

/// A key that passed verification
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedKey {
    pub key_id: String,
    pub api_id: String,
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub meta: KeyMeta,
    /// Remaining uses after this verification; `None` is unlimited
    pub remaining: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
}

impl VerifiedKey {
    pub fn from_key(key: &Key) -> Self {
        Self {
            key_id: key.id().to_string(),
            api_id: key.api_id().to_string(),
            owner_id: key.owner_id().map(String::from),
            name: key.name().map(String::from),
            meta: key.meta().clone(),
            remaining: key.remaining(),
            expires: key.expires(),
        }
    }
}

/// Why a key failed verification
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("key not found")]
    NotFound,

    #[error("key '{key_id}' has no remaining uses")]
    OutOfCredits { key_id: String },

    #[error("key '{key_id}' has expired")]
    Expired { key_id: String },

    #[error("key '{key_id}' does not belong to the requested api")]
    ApiMismatch { key_id: String },

    #[error(transparent)]
    Store(#[from] DomainError),
}

impl VerificationError {
    /// Machine readable code returned to clients
    pub fn code(&self) -> VerificationCode {
        match self {
            Self::NotFound => VerificationCode::NotFound,
            Self::OutOfCredits { .. } => VerificationCode::UsageExceeded,
            Self::Expired { .. } => VerificationCode::Expired,
            Self::ApiMismatch { .. } => VerificationCode::Forbidden,
            Self::Store(_) => VerificationCode::InternalError,
        }
    }

    /// Key id the failure refers to, when the key exists
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::OutOfCredits { key_id } | Self::Expired { key_id } => Some(key_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationCode {
    Valid,
    NotFound,
    UsageExceeded,
    Expired,
    Forbidden,
    InternalError,
}

impl VerificationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NotFound => "not_found",
            Self::UsageExceeded => "usage_exceeded",
            Self::Expired => "expired",
            Self::Forbidden => "forbidden",
            Self::InternalError => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(remaining: Option<i64>) -> Key {
        Key::new("key_1", "api_1", "hash", "sk_abcd").with_remaining(remaining)
    }

    #[test]
    fn test_new_key_defaults() {
        let key = key(None);
        assert!(key.is_unlimited());
        assert!(!key.is_deleted());
        assert!(key.meta().is_empty());
    }

    #[test]
    fn test_mark_deleted_is_idempotent() {
        let mut key = key(None);
        assert!(key.mark_deleted(Utc::now()));
        assert!(!key.mark_deleted(Utc::now()));
        assert!(key.is_deleted());
    }

    #[test]
    fn test_expiry() {
        let expires = DateTime::from_timestamp_millis(5_000).unwrap();
        let key = key(None).with_expires(Some(expires));

        assert!(!key.is_expired_at(4_999));
        assert!(key.is_expired_at(5_000));
    }

    #[test]
    fn test_apply_remaining_set() {
        let mut key = key(Some(3));
        assert_eq!(key.apply_remaining(RemainingUpdate::Set(Some(10))).unwrap(), Some(10));
        assert_eq!(key.apply_remaining(RemainingUpdate::Set(None)).unwrap(), None);
        assert!(key.apply_remaining(RemainingUpdate::Set(Some(-1))).is_err());
    }

    #[test]
    fn test_apply_remaining_decrement_saturates() {
        let mut key = key(Some(3));
        assert_eq!(key.apply_remaining(RemainingUpdate::Decrement(5)).unwrap(), Some(0));
        assert_eq!(key.apply_remaining(RemainingUpdate::Increment(2)).unwrap(), Some(2));
    }

    #[test]
    fn test_apply_remaining_rejects_negative_delta() {
        let mut key = key(Some(3));

        for update in [RemainingUpdate::Increment(-5), RemainingUpdate::Decrement(-1)] {
            let result = key.apply_remaining(update);
            assert!(matches!(result, Err(DomainError::Validation { .. })));
        }
        assert_eq!(key.remaining(), Some(3));
    }

    #[test]
    fn test_apply_remaining_on_unlimited() {
        let mut key = key(None);
        assert!(key.apply_remaining(RemainingUpdate::Increment(1)).is_err());
        assert!(key.apply_remaining(RemainingUpdate::Decrement(1)).is_err());
    }

    #[test]
    fn test_verification_codes() {
        assert_eq!(VerificationError::NotFound.code(), VerificationCode::NotFound);
        assert_eq!(
            VerificationError::OutOfCredits {
                key_id: "key_1".into()
            }
            .code(),
            VerificationCode::UsageExceeded
        );
        assert_eq!(
            serde_json::to_string(&VerificationCode::UsageExceeded).unwrap(),
            "\"USAGE_EXCEEDED\""
        );
    }

    #[test]
    fn test_key_cache_roundtrip_keeps_hash() {
        let key = key(Some(1)).with_owner_id("user_1");
        let json = serde_json::to_string(&key).unwrap();
        let back: Key = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
