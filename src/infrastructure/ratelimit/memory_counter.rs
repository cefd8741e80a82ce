//! In-memory window counters

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::ratelimit::RatelimitCounter;
use crate::domain::{Clock, DomainError, SystemClock};

/// How often expired counters are swept, in milliseconds
const SWEEP_INTERVAL_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: u64,
    /// Unix millis
    expires_at: i64,
}

#[derive(Debug, Default)]
struct State {
    counters: HashMap<String, Counter>,
    last_sweep: i64,
}

/// Process-local counters guarded by a single mutex
#[derive(Debug)]
pub struct InMemoryRatelimitCounter {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRatelimitCounter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                counters: HashMap::new(),
                last_sweep: clock.now_millis(),
            }),
            clock,
        }
    }

    /// Number of live counters
    pub async fn len(&self) -> usize {
        let now = self.clock.now_millis();
        let state = self.state.lock().await;
        state.counters.values().filter(|c| c.expires_at > now).count()
    }

    fn maybe_sweep(state: &mut State, now: i64) {
        if now - state.last_sweep < SWEEP_INTERVAL_MS {
            return;
        }

        let before = state.counters.len();
        state.counters.retain(|_, c| c.expires_at > now);
        state.last_sweep = now;

        debug!(
            removed = before - state.counters.len(),
            "Swept expired rate limit counters"
        );
    }
}

impl Default for InMemoryRatelimitCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RatelimitCounter for InMemoryRatelimitCounter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn increment(&self, key: &str, cost: u64, expires_at: i64) -> Result<u64, DomainError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().await;
        Self::maybe_sweep(&mut state, now);

        let counter = state.counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at,
        });

        if counter.expires_at <= now {
            counter.value = 0;
        }

        counter.value = counter.value.saturating_add(cost);
        counter.expires_at = expires_at;

        Ok(counter.value)
    }

    async fn current(&self, key: &str) -> Result<u64, DomainError> {
        let now = self.clock.now_millis();
        let state = self.state.lock().await;

        Ok(state
            .counters
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| c.value)
            .unwrap_or(0))
    }
}
