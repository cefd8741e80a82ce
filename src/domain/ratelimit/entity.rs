//! Rate limit entities and window arithmetic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Logical grouping of rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatelimitNamespace {
    id: String,
    workspace_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl RatelimitNamespace {
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

/// Identifier-specific limit that supersedes the request default
///
/// `identifier` may contain `*` wildcards, e.g. `user_*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatelimitOverride {
    id: String,
    namespace_id: String,
    identifier: String,
    limit: u64,
    /// Window length in milliseconds
    duration: u64,
    #[serde(rename = "async")]
    async_mode: bool,
    created_at: DateTime<Utc>,
}

impl RatelimitOverride {
    pub fn new(
        id: impl Into<String>,
        namespace_id: impl Into<String>,
        identifier: impl Into<String>,
        limit: u64,
        duration: u64,
    ) -> Self {
        Self {
            id: id.into(),
            namespace_id: namespace_id.into(),
            identifier: identifier.into(),
            limit,
            duration,
            async_mode: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn namespace_id(&self) -> &str {
        &self.namespace_id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn is_async(&self) -> bool {
        self.async_mode
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_wildcard(&self) -> bool {
        self.identifier.contains('*')
    }

    /// Whether this override applies to `identifier`
    pub fn matches(&self, identifier: &str) -> bool {
        if !self.is_wildcard() {
            return self.identifier == identifier;
        }

        let pattern = format!(
            "^{}$",
            regex::escape(&self.identifier).replace(r"\*", ".*")
        );

        regex::Regex::new(&pattern)
            .map(|re| re.is_match(identifier))
            .unwrap_or(false)
    }
}

/// Picks the override that governs `identifier`
///
/// An exact match always wins; otherwise the longest matching wildcard
/// pattern is used.
pub fn find_matching_override<'a>(
    overrides: &'a [RatelimitOverride],
    identifier: &str,
) -> Option<&'a RatelimitOverride> {
    if let Some(exact) = overrides
        .iter()
        .find(|o| !o.is_wildcard() && o.identifier() == identifier)
    {
        return Some(exact);
    }

    overrides
        .iter()
        .filter(|o| o.is_wildcard() && o.matches(identifier))
        .max_by_key(|o| o.identifier().len())
}

/// Effective limit after override resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub limit: u64,
    pub duration: u64,
    pub async_mode: bool,
}

impl From<&RatelimitOverride> for LimitConfig {
    fn from(o: &RatelimitOverride) -> Self {
        Self {
            limit: o.limit(),
            duration: o.duration(),
            async_mode: o.is_async(),
        }
    }
}

/// A single rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RatelimitRequest {
    pub namespace_id: String,
    pub identifier: String,
    /// Default limit, used when no override matches
    pub limit: u64,
    /// Default window in milliseconds
    pub duration: u64,
    /// Units consumed by this check; 0 only peeks
    pub cost: u64,
    pub async_mode: bool,
}

impl RatelimitRequest {
    pub fn new(
        namespace_id: impl Into<String>,
        identifier: impl Into<String>,
        limit: u64,
        duration: u64,
    ) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            identifier: identifier.into(),
            limit,
            duration,
            cost: 1,
            async_mode: false,
        }
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn default_limit(&self) -> LimitConfig {
        LimitConfig {
            limit: self.limit,
            duration: self.duration,
            async_mode: self.async_mode,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_identifier(&self.identifier)?;
        validate_duration(self.duration)
    }
}

/// Decision for a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatelimitResponse {
    pub success: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Start of the next window, unix millis
    pub reset_at: i64,
}

/// Fixed window containing a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// `floor(now / duration)`
    pub sequence: i64,
    pub start: i64,
    pub reset_at: i64,
}

impl Window {
    /// `duration` above [`MAX_DURATION`] is clamped to it
    pub fn at(now: i64, duration: u64) -> Self {
        let duration = i64::try_from(duration.clamp(1, MAX_DURATION)).unwrap_or(i64::MAX);
        let sequence = now.div_euclid(duration);
        let start = sequence * duration;

        Self {
            sequence,
            start,
            reset_at: start.saturating_add(duration),
        }
    }

    /// Counter key for an identifier within this window
    pub fn counter_key(&self, namespace_id: &str, identifier: &str, duration: u64) -> String {
        format!("{}:{}:{}:{}", namespace_id, identifier, duration, self.sequence)
    }
}

/// Cursor-paginated list
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass back to fetch the next page; `None` on the last page
    pub cursor: Option<String>,
    pub total: usize,
}

pub fn validate_identifier(identifier: &str) -> Result<(), DomainError> {
    if identifier.trim().is_empty() {
        return Err(DomainError::validation("identifier must not be empty"));
    }
    Ok(())
}

/// Longest accepted window, 365 days in milliseconds
pub const MAX_DURATION: u64 = 365 * 24 * 60 * 60 * 1000;

pub fn validate_duration(duration: u64) -> Result<(), DomainError> {
    if duration == 0 {
        return Err(DomainError::validation("duration must be greater than 0"));
    }
    if duration > MAX_DURATION {
        return Err(DomainError::validation(format!(
            "duration must not exceed {} milliseconds",
            MAX_DURATION
        )));
    }
    Ok(())
}
