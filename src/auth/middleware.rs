//! Authentication Middleware
//!
//! Axum middleware for bearer-token validation and user resolution.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::auth::models::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

/// Authentication middleware that validates JWT tokens and injects user info
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Reject the request with 401 unless it carries a valid bearer token
    /// for a user that still exists.
    pub async fn validate_token(
        State(state): State<AppState>,
        mut req: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        let auth_user = authenticate(&state, req.headers()).await?;
        tracing::debug!(
            "[AuthMiddleware] {} {} as user {} ({})",
            req.method(),
            req.uri(),
            auth_user.id,
            auth_user.account_type
        );

        req.extensions_mut().insert(auth_user);
        Ok(next.run(req).await)
    }

    /// Optional authentication - doesn't fail if no token is provided
    pub async fn optional_auth(
        State(state): State<AppState>,
        mut req: Request,
        next: Next,
    ) -> Response {
        if req.headers().typed_get::<Authorization<Bearer>>().is_some() {
            match authenticate(&state, req.headers()).await {
                Ok(auth_user) => {
                    req.extensions_mut().insert(auth_user);
                }
                Err(e) => tracing::debug!("[AuthMiddleware] Ignoring bad optional token: {}", e),
            }
        }

        next.run(req).await
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    let Some(bearer) = headers.typed_get::<Authorization<Bearer>>() else {
        tracing::warn!("[AuthMiddleware] Missing bearer token");
        return Err(ApiError::InvalidToken);
    };

    let claims = state.jwt_service.decode_claims(bearer.token()).map_err(|e| {
        tracing::warn!("[AuthMiddleware] JWT validation failed: {:#}", e);
        ApiError::InvalidToken
    })?;

    let user = state
        .repo
        .find_user_by_id(claims.user_id)
        .await
        .map_err(|e| ApiError::internal("Error resolving the authenticated user", e))?
        .ok_or_else(|| {
            tracing::warn!("[AuthMiddleware] Token refers to missing user {}", claims.user_id);
            ApiError::InvalidToken
        })?;

    Ok(AuthUser::from(&user))
}
