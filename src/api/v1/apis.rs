//! Api endpoint handlers

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::RequireRootKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiBody {
    pub name: String,
    pub workspace_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiResponse {
    pub api_id: String,
}

/// POST /v1/apis.createApi
pub async fn create_api(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<CreateApiBody>,
) -> Result<Json<CreateApiResponse>, ApiError> {
    debug!(name = %body.name, "Creating api");

    let api = state
        .key_service
        .create_api(&body.name, body.workspace_id.as_deref())
        .await?;

    Ok(Json(CreateApiResponse {
        api_id: api.id().to_string(),
    }))
}
