//! Key endpoint handlers

use axum::extract::{rejection::QueryRejection, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::middleware::RequireRootKey;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{Key, KeyMeta, RemainingUpdate, VerificationCode, VerificationError};
use crate::infrastructure::key::CreateKeyRequest;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyBody {
    pub api_id: String,
    pub byte_length: Option<usize>,
    pub prefix: Option<String>,
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub meta: Option<KeyMeta>,
    pub remaining: Option<i64>,
    /// Unix millis
    pub expires: Option<i64>,
}

impl From<CreateKeyBody> for CreateKeyRequest {
    fn from(body: CreateKeyBody) -> Self {
        Self {
            api_id: body.api_id,
            byte_length: body.byte_length,
            prefix: body.prefix,
            owner_id: body.owner_id,
            name: body.name,
            meta: body.meta,
            remaining: body.remaining,
            expires: body.expires,
        }
    }
}

/// The plaintext key is only ever returned here
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub id: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKeyBody {
    pub key: String,
    pub api_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKeyResponse {
    pub valid: bool,
    pub code: VerificationCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<KeyMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl VerifyKeyResponse {
    fn rejected(err: &VerificationError) -> Self {
        Self {
            valid: false,
            code: err.code(),
            key_id: err.key_id().map(String::from),
            owner_id: None,
            meta: None,
            remaining: None,
            expires: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyIdBody {
    pub key_id: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemainingOp {
    Set,
    Increment,
    Decrement,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRemainingBody {
    pub key_id: String,
    pub op: RemainingOp,
    pub value: Option<i64>,
}

impl UpdateRemainingBody {
    fn to_update(&self) -> Result<RemainingUpdate, ApiError> {
        let required = || {
            self.value
                .ok_or_else(|| ApiError::bad_request("value is required for increment and decrement"))
        };

        match self.op {
            RemainingOp::Set => Ok(RemainingUpdate::Set(self.value)),
            RemainingOp::Increment => Ok(RemainingUpdate::Increment(required()?)),
            RemainingOp::Decrement => Ok(RemainingUpdate::Decrement(required()?)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateRemainingResponse {
    pub remaining: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeyQuery {
    pub key_id: String,
}

/// Public view of a key; never carries the hash
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub id: String,
    pub api_id: String,
    pub start: String,
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub meta: KeyMeta,
    pub remaining: Option<i64>,
    pub expires: Option<i64>,
    pub created_at: i64,
}

impl KeyResponse {
    pub fn from_domain(key: &Key) -> Self {
        Self {
            id: key.id().to_string(),
            api_id: key.api_id().to_string(),
            start: key.start().to_string(),
            owner_id: key.owner_id().map(String::from),
            name: key.name().map(String::from),
            meta: key.meta().clone(),
            remaining: key.remaining(),
            expires: key.expires().map(|e| e.timestamp_millis()),
            created_at: key.created_at().timestamp_millis(),
        }
    }
}

/// POST /v1/keys.createKey
pub async fn create_key(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<CreateKeyBody>,
) -> Result<Json<CreateKeyResponse>, ApiError> {
    debug!(api_id = %body.api_id, "Creating key");

    let created = state.key_service.create(body.into()).await?;

    Ok(Json(CreateKeyResponse {
        id: created.key_id,
        key: created.key,
    }))
}

/// POST /v1/keys.verifyKey
///
/// Rejections are 200 with `valid: false`; only store failures are errors.
pub async fn verify_key(
    State(state): State<AppState>,
    Json(body): Json<VerifyKeyBody>,
) -> Result<Json<VerifyKeyResponse>, ApiError> {
    let result = state
        .key_service
        .verify(&body.key, body.api_id.as_deref())
        .await;

    let response = match result {
        Ok(verified) => VerifyKeyResponse {
            valid: true,
            code: VerificationCode::Valid,
            key_id: Some(verified.key_id),
            owner_id: verified.owner_id,
            meta: Some(verified.meta),
            remaining: verified.remaining,
            expires: verified.expires.map(|e| e.timestamp_millis()),
        },
        Err(VerificationError::Store(e)) => return Err(e.into()),
        Err(e) => VerifyKeyResponse::rejected(&e),
    };

    Ok(Json(response))
}

/// POST /v1/keys.deleteKey
pub async fn delete_key(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<KeyIdBody>,
) -> Result<Json<Value>, ApiError> {
    state.key_service.delete(&body.key_id).await?;
    Ok(Json(json!({})))
}

/// POST /v1/keys.updateRemaining
pub async fn update_remaining(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    Json(body): Json<UpdateRemainingBody>,
) -> Result<Json<UpdateRemainingResponse>, ApiError> {
    let update = body.to_update()?;
    let remaining = state
        .key_service
        .update_remaining(&body.key_id, update)
        .await?;

    Ok(Json(UpdateRemainingResponse { remaining }))
}

/// GET /v1/keys.getKey?keyId=
pub async fn get_key(
    State(state): State<AppState>,
    _auth: RequireRootKey,
    query: Result<Query<GetKeyQuery>, QueryRejection>,
) -> Result<Json<KeyResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let key = state.key_service.get(&query.key_id).await?;

    Ok(Json(KeyResponse::from_domain(&key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(op: RemainingOp, value: Option<i64>) -> UpdateRemainingBody {
        UpdateRemainingBody {
            key_id: "key_1".to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_update_ops() {
        assert_eq!(
            body(RemainingOp::Set, None).to_update().unwrap(),
            RemainingUpdate::Set(None)
        );
        assert_eq!(
            body(RemainingOp::Increment, Some(3)).to_update().unwrap(),
            RemainingUpdate::Increment(3)
        );
        assert!(body(RemainingOp::Decrement, None).to_update().is_err());
    }

    #[test]
    fn test_rejected_response_shape() {
        let response = VerifyKeyResponse::rejected(&VerificationError::OutOfCredits {
            key_id: "key_1".to_string(),
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json, json!({"valid": false, "code": "USAGE_EXCEEDED", "keyId": "key_1"}));
    }
}
