//! Authentication middleware

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bizdir_billing::{CallerIdentity, PlanChangeError};
use bizdir_shared::UserId;
use uuid::Uuid;

use super::jwt::JwtManager;
use crate::error::{ApiError, PlanChangeFailure};

/// State needed by the authentication middleware
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

/// Why a request could not be authenticated
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token subject is not a user id")]
    InvalidSubject,
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from the request headers
pub fn authenticate(jwt: &JwtManager, headers: &HeaderMap) -> Result<CallerIdentity, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::MissingToken)?;
    let claims = jwt
        .validate_token(token)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidSubject)?;

    Ok(CallerIdentity {
        user_id: UserId::from(user_id),
        email: claims.email,
    })
}

/// Require a valid session; rejects with a 401 [`ApiError`]
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&auth_state.jwt_manager, request.headers()) {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(AuthError::MissingToken) => ApiError::Unauthorized.into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected request with invalid credentials");
            ApiError::InvalidToken.into_response()
        }
    }
}

/// Require a valid session on the plan-change function.
///
/// Failures use the plan-change error envelope so the dashboard handles
/// them like any other terminal failure.
pub async fn require_plan_change_auth(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&auth_state.jwt_manager, request.headers()) {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected plan change without a valid session");
            PlanChangeFailure(PlanChangeError::Unauthenticated).into_response()
        }
    }
}
