// # Routes Module
//
// HTTP route handlers grouped by resource. Each module exposes a
// `create_*_routes` function that `server::build_router` merges.

/// Health check endpoints
pub mod health;

/// Login
pub mod auth;

/// Profile, directory, messaging and conversations
pub mod users;

/// Student registration and workflow-instance updates
pub mod students;

/// Admin registration, roster, companies, deletions
pub mod admin;

use crate::error::{ApiError, ApiResult};

/// Trimmed value of a required text field.
pub(crate) fn required(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Trimmed, lower-cased email with a minimal shape check.
pub(crate) fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::BadRequest(format!("{email:?} is not a valid email address")));
    }
    Ok(email)
}
