//! Auth routes: OAuth2 password-flow login

use axum::{Form, Json, Router, extract::State, routing::post};

use crate::auth::models::{LoginForm, TokenResponse};
use crate::auth::password::verify_password;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Exchange email + password for a bearer token.
///
/// Unknown emails and wrong passwords both answer 403 "Invalid Credentials".
pub async fn login(
    State(app_state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<TokenResponse>> {
    let email = form.username.trim().to_lowercase();

    let user = app_state
        .repo
        .find_user_by_email(&email)
        .await
        .map_err(|e| ApiError::internal("Error looking up user", e))?;

    let Some(user) = user else {
        tracing::info!("Login rejected: unknown email");
        return Err(ApiError::invalid_credentials());
    };

    if !verify_password(&form.password, &user.password_hash) {
        tracing::info!("Login rejected: bad password for user {}", user.id);
        return Err(ApiError::invalid_credentials());
    }

    let issued = app_state
        .jwt_service
        .create_token(user.id, &user.email, form.remember_me)
        .map_err(|e| ApiError::internal("Error issuing access token", e))?;

    tracing::info!(
        "User {} ({}) logged in, remember_me={}",
        user.id,
        user.account_type,
        form.remember_me
    );
    Ok(Json(TokenResponse::new(issued.token, issued.expires_in)))
}

pub fn create_auth_routes() -> Router<AppState> {
    Router::new().route("/auth", post(login))
}
