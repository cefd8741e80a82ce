//! Rate limit endpoint handlers

use axum::extract::{rejection::QueryRejection, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::middleware::RequireRootKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{RatelimitOverride, RatelimitRequest};
use crate::infrastructure::ratelimit::SetOverrideRequest;

fn default_cost() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitBody {
    pub namespace_id: String,
    pub identifier: String,
    pub limit: u64,
    /// Window length in milliseconds
    pub duration: u64,
    #[serde(default = "default_cost")]
    pub cost: u64,
    #[serde(default, rename = "async")]
    pub async_mode: bool,
}

impl From<LimitBody> for RatelimitRequest {
    fn from(body: LimitBody) -> Self {
        RatelimitRequest::new(body.namespace_id, body.identifier, body.limit, body.duration)
            .with_cost(body.cost)
            .with_async(body.async_mode)
    }
}

#[derive(Debug, Serialize)]
pub struct LimitResponse {
    pub success: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix millis at which the window resets
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNamespaceBody {
    pub name: String,
    pub workspace_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNamespaceResponse {
    pub namespace_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOverrideBody {
    pub namespace_id: String,
    pub identifier: String,
    pub limit: u64,
    pub duration: u64,
    #[serde(default, rename = "async")]
    pub async_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOverrideResponse {
    pub override_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideLookup {
    pub namespace_id: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOverridesQuery {
    pub namespace_id: String,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// Override as returned by getOverride and listOverrides; the owning
/// namespace id is serialized as `namespace`
#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    pub id: String,
    pub namespace: String,
    pub identifier: String,
    pub limit: u64,
    pub duration: u64,
    #[serde(rename = "async")]
    pub async_mode: bool,
}

impl OverrideResponse {
    pub fn from_domain(o: &RatelimitOverride) -> Self {
        Self {
            id: o.id().to_string(),
            namespace: o.namespace_id().to_string(),
            identifier: o.identifier().to_string(),
            limit: o.limit(),
            duration: o.duration(),
            async_mode: o.is_async(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListOverridesResponse {
    pub overrides: Vec<OverrideResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub total: usize,
}

/// POST /v1/ratelimits.limit
pub async fn limit(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<LimitBody>,
) -> Result<Json<LimitResponse>, ApiError> {
    let response = state.ratelimit_service.check(body.into()).await?;

    Ok(Json(LimitResponse {
        success: response.success,
        limit: response.limit,
        remaining: response.remaining,
        reset: response.reset_at,
    }))
}

/// POST /v1/ratelimit.createNamespace
pub async fn create_namespace(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<CreateNamespaceBody>,
) -> Result<Json<CreateNamespaceResponse>, ApiError> {
    let namespace = state
        .ratelimit_service
        .create_namespace(&body.name, body.workspace_id.as_deref())
        .await?;

    Ok(Json(CreateNamespaceResponse {
        namespace_id: namespace.id().to_string(),
    }))
}

/// POST /v1/ratelimit.setOverride
pub async fn set_override(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<SetOverrideBody>,
) -> Result<Json<SetOverrideResponse>, ApiError> {
    let stored = state
        .ratelimit_service
        .set_override(SetOverrideRequest {
            namespace_id: body.namespace_id,
            identifier: body.identifier,
            limit: body.limit,
            duration: body.duration,
            async_mode: body.async_mode,
        })
        .await?;

    Ok(Json(SetOverrideResponse {
        override_id: stored.id().to_string(),
    }))
}

/// GET /v1/ratelimit.getOverride?namespaceId=&identifier=
pub async fn get_override(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    query: Result<Query<OverrideLookup>, QueryRejection>,
) -> Result<Json<OverrideResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let found = state
        .ratelimit_service
        .get_override(&query.namespace_id, &query.identifier)
        .await?;

    Ok(Json(OverrideResponse::from_domain(&found)))
}

/// POST /v1/ratelimit.deleteOverride
pub async fn delete_override(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<OverrideLookup>,
) -> Result<Json<Value>, ApiError> {
    state
        .ratelimit_service
        .delete_override(&body.namespace_id, &body.identifier)
        .await?;

    Ok(Json(json!({})))
}

/// GET /v1/ratelimit.listOverrides?namespaceId=&limit=&cursor=
pub async fn list_overrides(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    query: Result<Query<ListOverridesQuery>, QueryRejection>,
) -> Result<Json<ListOverridesResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = state
        .ratelimit_service
        .list_overrides(&query.namespace_id, query.limit, query.cursor.as_deref())
        .await?;

    Ok(Json(ListOverridesResponse {
        overrides: page.items.iter().map(OverrideResponse::from_domain).collect(),
        cursor: page.cursor,
        total: page.total,
    }))
}
