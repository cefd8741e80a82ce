//! Application state for HTTP handlers

use std::collections::HashSet;
use std::sync::Arc;

use crate::infrastructure::key::KeyService;
use crate::infrastructure::ratelimit::RatelimitService;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub key_service: KeyService,
    pub ratelimit_service: RatelimitService,
    root_keys: Arc<HashSet<String>>,
}

impl AppState {
    /// `root_keys` holds digests of accepted root keys
    pub fn new(
        key_service: KeyService,
        ratelimit_service: RatelimitService,
        root_keys: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            key_service,
            ratelimit_service,
            root_keys: Arc::new(root_keys.into_iter().collect()),
        }
    }

    /// Root key checks are skipped when no root keys are configured
    pub fn auth_enabled(&self) -> bool {
        !self.root_keys.is_empty()
    }

    pub fn is_root_key(&self, digest: &str) -> bool {
        self.root_keys.contains(digest)
    }
}
