//! Cache entries with fresh/stale windows

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A cached value together with its freshness bounds (unix millis)
///
/// Serialized as `{"value":…,"freshUntil":…,"staleUntil":…}`, which is
/// also the wire format written to Redis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    pub fresh_until: i64,
    pub stale_until: i64,
}

/// Where an entry sits relative to its windows at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Expired,
}

impl<T> CacheEntry<T> {
    /// Builds an entry starting at `now`; `stale` is clamped so that
    /// `fresh_until <= stale_until` always holds.
    pub fn new(value: T, now: i64, freshness: Freshness) -> Self {
        let fresh_until = now.saturating_add(millis(freshness.fresh));
        let stale_until = now.saturating_add(millis(freshness.stale)).max(fresh_until);

        Self {
            value,
            fresh_until,
            stale_until,
        }
    }

    pub fn state_at(&self, now: i64) -> EntryState {
        if now < self.fresh_until {
            EntryState::Fresh
        } else if now < self.stale_until {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }
}

/// Fresh and stale durations for a cache namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub fresh: Duration,
    pub stale: Duration,
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Freshness {
    pub fn new(fresh: Duration, stale: Duration) -> Self {
        Self { fresh, stale }
    }

    pub fn from_millis(fresh: u64, stale: u64) -> Self {
        Self::new(Duration::from_millis(fresh), Duration::from_millis(stale))
    }
}

/// Logical groups of cached data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Key rows looked up by digest
    KeyByHash,
    /// Apis by id
    ApiById,
    /// Rate limit namespaces by id
    RatelimitNamespace,
    /// All overrides of a rate limit namespace
    RatelimitOverrides,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyByHash => "keyByHash",
            Self::ApiById => "apiById",
            Self::RatelimitNamespace => "ratelimitNamespace",
            Self::RatelimitOverrides => "ratelimitOverrides",
        }
    }

    pub fn default_freshness(&self) -> Freshness {
        match self {
            Self::KeyByHash => Freshness::new(Duration::from_secs(10), Duration::from_secs(60)),
            Self::ApiById | Self::RatelimitNamespace => {
                Freshness::new(Duration::from_secs(60), Duration::from_secs(300))
            }
            Self::RatelimitOverrides => {
                Freshness::new(Duration::from_secs(30), Duration::from_secs(120))
            }
        }
    }

    /// Storage key for `key` inside this namespace
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.as_str(), key)
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_windows() {
        let entry = CacheEntry::new("v", 1_000, Freshness::from_millis(100, 500));

        assert_eq!(entry.fresh_until, 1_100);
        assert_eq!(entry.stale_until, 1_500);
        assert_eq!(entry.state_at(1_000), EntryState::Fresh);
        assert_eq!(entry.state_at(1_099), EntryState::Fresh);
        assert_eq!(entry.state_at(1_100), EntryState::Stale);
        assert_eq!(entry.state_at(1_499), EntryState::Stale);
        assert_eq!(entry.state_at(1_500), EntryState::Expired);
    }

    #[test]
    fn test_stale_never_before_fresh() {
        let entry = CacheEntry::new(1u8, 0, Freshness::from_millis(500, 100));
        assert!(entry.fresh_until <= entry.stale_until);
    }

    #[test]
    fn test_wire_format() {
        let entry = CacheEntry {
            value: serde_json::json!({"id": "key_1"}),
            fresh_until: 10,
            stale_until: 20,
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"value":{"id":"key_1"},"freshUntil":10,"staleUntil":20}"#);
    }

    #[test]
    fn test_namespaced_key() {
        assert_eq!(CacheNamespace::KeyByHash.key("abc"), "keyByHash:abc");
        assert_eq!(
            CacheNamespace::RatelimitOverrides.key("rlns_1"),
            "ratelimitOverrides:rlns_1"
        );
    }
}
