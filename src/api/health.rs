//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::warn;

use crate::api::state::AppState;
use crate::api::types::Json;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

fn report(status: HealthStatus) -> HealthResponse {
    HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Returns 200 while the process serves requests
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(report(HealthStatus::Healthy)))
}

/// Liveness check, never touches the key store
pub async fn live_check() -> impl IntoResponse {
    (StatusCode::OK, Json(report(HealthStatus::Healthy)))
}

/// Readiness check: 503 while the key store is unreachable
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.key_service.ping().await {
        Ok(()) => (StatusCode::OK, Json(report(HealthStatus::Healthy))),
        Err(e) => {
            warn!(error = %e, "Key store is not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(report(HealthStatus::Unhealthy)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::build_app_state;
    use crate::domain::key::UnavailableKeyRepository;
    use crate::domain::ManualClock;
    use crate::infrastructure::cache::{InMemoryCacheConfig, InMemoryCacheStore};
    use crate::infrastructure::ratelimit::{InMemoryRatelimitCounter, InMemoryRatelimitRepository};
    use crate::infrastructure::storage::{Repositories, StorageFactory};

    fn state(repositories: Repositories) -> AppState {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(InMemoryCacheStore::with_config(
            InMemoryCacheConfig::default(),
            clock.clone(),
        ));
        build_app_state(
            repositories,
            store,
            Arc::new(InMemoryRatelimitCounter::with_clock(clock.clone())),
            clock,
            Vec::new(),
        )
    }

    #[test]
    fn test_health_response_serialization() {
        let json = serde_json::to_value(report(HealthStatus::Healthy)).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));

        let json = serde_json::to_value(report(HealthStatus::Unhealthy)).unwrap();
        assert_eq!(json["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_ready_check_healthy_store() {
        let response = ready_check(State(state(StorageFactory::in_memory())))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_check_unavailable_store() {
        let repositories = Repositories {
            keys: Arc::new(UnavailableKeyRepository),
            ratelimits: Arc::new(InMemoryRatelimitRepository::new()),
        };

        let response = ready_check(State(state(repositories))).await.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "unhealthy");
    }
}
