//! Admin routes: admin registration, student roster, companies, deletions

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, patch, post},
};
use serde::Deserialize;

use crate::auth::middleware::AuthMiddleware;
use crate::auth::models::AuthUser;
use crate::auth::password::hash_password;
use crate::database::models::{Admin, NewAdmin, User};
use crate::error::{ApiError, ApiResult};
use crate::routes::users::AvatarRequest;
use crate::routes::{normalize_email, required};
use crate::server::AppState;
use crate::services::RemoteRow;
use crate::services::roster::merge_students;

#[derive(Debug, Deserialize)]
pub struct RegisterAdminRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Create an admin account.
///
/// Open while no admin exists yet; afterwards only admins may add admins.
/// Of several concurrent bootstrap requests exactly one succeeds.
pub async fn register_admin(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Json(payload): Json<RegisterAdminRequest>,
) -> ApiResult<(StatusCode, Json<Admin>)> {
    let admins = state
        .repo
        .count_admins()
        .await
        .map_err(|e| ApiError::internal("Error adding admin to the database", e))?;

    let bootstrap = admins == 0;
    if !bootstrap {
        match auth_user {
            Some(Extension(caller)) => caller.require_admin()?,
            None => {
                tracing::warn!("Anonymous admin registration rejected");
                return Err(ApiError::unauthorized());
            }
        }
    } else {
        tracing::info!("No admins yet, accepting bootstrap registration");
    }

    let name = required("name", &payload.name)?;
    let surname = required("surname", &payload.surname)?;
    let username = required("username", &payload.username)?;
    let email = normalize_email(&payload.email)?;
    if payload.password.trim().is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".to_string()));
    }

    let existing = state
        .repo
        .find_user_by_email(&email)
        .await
        .map_err(|e| ApiError::internal("Error adding admin to the database", e))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }
    let username_taken = state
        .repo
        .username_taken(&username)
        .await
        .map_err(|e| ApiError::internal("Error adding admin to the database", e))?;
    if username_taken {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }

    let password_hash = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("Error hashing password", e))?;

    let new_admin = NewAdmin {
        name,
        surname,
        email,
        password_hash,
        username,
    };
    let admin = if bootstrap {
        state
            .repo
            .insert_first_admin(new_admin)
            .await
            .map_err(|e| ApiError::internal("Error adding admin to the database", e))?
            .ok_or_else(|| {
                tracing::warn!("Bootstrap registration lost to a concurrent one");
                ApiError::unauthorized()
            })?
    } else {
        state
            .repo
            .insert_admin(new_admin)
            .await
            .map_err(|e| ApiError::internal("Error adding admin to the database", e))?
    };

    tracing::info!("Registered admin {} ({})", admin.user.id, admin.username);
    Ok((StatusCode::CREATED, Json(admin)))
}

/// Record-store students enriched with local ids and process instances
pub async fn list_students(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<RemoteRow>>> {
    auth_user.require_admin()?;

    let local = state
        .repo
        .student_links()
        .await
        .map_err(|e| ApiError::internal("Error fetching students from the database", e))?;
    let remote = state
        .record_store
        .list_students()
        .await
        .map_err(|e| ApiError::internal("Error fetching students from the record store", e))?;

    Ok(Json(merge_students(&local, remote)))
}

pub async fn list_companies(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<RemoteRow>>> {
    auth_user.require_admin()?;

    let companies = state
        .record_store
        .list_admin_companies()
        .await
        .map_err(|e| ApiError::internal("Error fetching companies from the record store", e))?;
    Ok(Json(companies))
}

/// Remove a student from the record store, the workflow engine and the
/// local database, in that order. Earlier steps are not undone on failure.
pub async fn delete_student(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    auth_user.require_admin()?;

    let student = state
        .repo
        .find_student(id)
        .await
        .map_err(|e| ApiError::internal("Error deleting student", e))?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    state
        .record_store
        .delete_student_by_email(&student.user.email)
        .await
        .map_err(|e| ApiError::internal("Error deleting student from the record store", e))?;

    if let Some(instance_id) = student.process_instance_id.as_deref() {
        state
            .workflow_engine
            .delete_instance(instance_id)
            .await
            .map_err(|e| {
                ApiError::internal("Error deleting process instance from the workflow engine", e)
            })?;
    }

    let deleted = state
        .repo
        .delete_student(id)
        .await
        .map_err(|e| ApiError::internal("Error deleting student from the database", e))?;
    if !deleted {
        return Err(ApiError::NotFound("Student not found".to_string()));
    }

    tracing::info!("Admin {} deleted student {}", auth_user.id, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_user_avatar(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<AvatarRequest>,
) -> ApiResult<Json<User>> {
    auth_user.require_admin()?;
    let avatar = required("avatar", &payload.avatar)?;

    state
        .repo
        .update_avatar(id, &avatar)
        .await
        .map_err(|e| ApiError::internal("Error updating avatar", e))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub fn create_admin_routes(state: &AppState) -> Router<AppState> {
    let registration = Router::new()
        .route("/admin", post(register_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            AuthMiddleware::optional_auth,
        ));

    let protected = Router::new()
        .route("/admin/students", get(list_students))
        .route("/admin/companies", get(list_companies))
        .route("/admin/students/{id}", delete(delete_student))
        .route("/admin/users/{id}/avatar", patch(update_user_avatar))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            AuthMiddleware::validate_token,
        ));

    registration.merge(protected)
}
