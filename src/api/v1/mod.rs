//! v1 API endpoints
//!
//! Routes follow the `<resource>.<operation>` naming, e.g.
//! `POST /v1/keys.verifyKey`.

pub mod apis;
pub mod keys;
pub mod ratelimit;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/apis.createApi", post(apis::create_api))
        .route("/keys.createKey", post(keys::create_key))
        .route("/keys.verifyKey", post(keys::verify_key))
        .route("/keys.deleteKey", post(keys::delete_key))
        .route("/keys.updateRemaining", post(keys::update_remaining))
        .route("/keys.getKey", get(keys::get_key))
        .route("/ratelimits.limit", post(ratelimit::limit))
        .route("/ratelimit.createNamespace", post(ratelimit::create_namespace))
        .route("/ratelimit.setOverride", post(ratelimit::set_override))
        .route("/ratelimit.getOverride", get(ratelimit::get_override))
        .route("/ratelimit.deleteOverride", post(ratelimit::delete_override))
        .route("/ratelimit.listOverrides", get(ratelimit::list_overrides))
}
