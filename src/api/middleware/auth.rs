//! Root key authentication

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::infrastructure::key::digest;

/// Extractor guarding management endpoints
///
/// Reads `Authorization: Bearer <root key>` and accepts the request when
/// the key's digest is configured in `auth.root_keys`.
#[derive(Debug, Clone, Copy)]
pub struct RequireRootKey;

impl FromRequestParts<AppState> for RequireRootKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.auth_enabled() {
            return Ok(RequireRootKey);
        }

        let token = extract_bearer_token(&parts.headers)?;
        let hash = digest(&token);

        if !state.is_root_key(&hash) {
            debug!(
                key_start = %token.chars().take(4).collect::<String>(),
                "Rejected unknown root key"
            );
            return Err(ApiError::forbidden("root key not accepted"));
        }

        Ok(RequireRootKey)
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let header_value = headers.get(header::AUTHORIZATION).ok_or_else(|| {
        ApiError::unauthorized("root key required. Provide via 'Authorization: Bearer <key>'")
    })?;

    let value = header_value
        .to_str()
        .map_err(|_| ApiError::bad_request("Invalid Authorization header encoding"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(ApiError::unauthorized(
            "Authorization header must use the Bearer scheme",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer root_abc".parse().unwrap());

        assert_eq!(extract_bearer_token(&headers).unwrap(), "root_abc");
    }

    #[test]
    fn test_trimmed_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer   root_abc  ".parse().unwrap());

        assert_eq!(extract_bearer_token(&headers).unwrap(), "root_abc");
    }

    #[test]
    fn test_missing_header() {
        let err = extract_bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());

        let err = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
