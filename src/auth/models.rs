//! Authentication Models
//!
//! Data structures for authentication requests, responses, and user information.

use serde::{Deserialize, Serialize};

use crate::database::models::{AccountType, User};
use crate::error::ApiError;

/// Authenticated user information resolved from the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub account_type: AccountType,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            account_type: user.account_type,
        }
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.account_type == AccountType::Admin
    }

    /// Reject non-admin callers with 401 "Unauthorized"
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            tracing::warn!("User {} attempted an admin-only action", self.id);
            Err(ApiError::unauthorized())
        }
    }

    pub fn require_student(&self) -> Result<(), ApiError> {
        if self.account_type == AccountType::Student {
            Ok(())
        } else {
            Err(ApiError::unauthorized())
        }
    }
}

/// OAuth2 password-flow login form; `username` carries the email
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub remember_me: bool,
}

/// Token response after successful authentication
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Form fields arrive as strings; accept the usual checkbox spellings.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    ))
}
