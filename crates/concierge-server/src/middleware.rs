//! Staff bearer-token authentication.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::api::ApiError;
use crate::AppState;

/// Verified token claims, stored in request extensions for staff handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Requires `Authorization: Bearer <jwt>` signed with the staff secret (HS256).
///
/// A missing or malformed header is 401, an unconfigured secret is 500 and a
/// token that fails verification (bad signature, expired) is 403.
pub async fn staff_auth_middleware(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
        .ok_or_else(|| {
            ApiError::Unauthorized("Authorization header missing or invalid".to_string())
        })?;

    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::InternalServerError("application state missing".to_string()))?
        .clone();

    let secret = state
        .staff_jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::InternalServerError("JWT secret not configured".to_string()))?;

    let claims = verify_staff_token(&token, secret).map_err(|e| {
        tracing::warn!(error = %e, "staff token verification failed");
        ApiError::Forbidden("Invalid or expired token".to_string())
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn verify_staff_token(token: &str, secret: &str) -> jsonwebtoken::errors::Result<StaffClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Staff tokens are not required to carry an expiry; one that does is
    // still checked.
    validation.required_spec_claims.clear();
    let data = decode::<StaffClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}
