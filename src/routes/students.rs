//! Student routes: public registration and workflow-instance updates

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{patch, post},
};
use serde::Deserialize;

use crate::auth::middleware::AuthMiddleware;
use crate::auth::models::AuthUser;
use crate::auth::password::hash_password;
use crate::database::models::{NewStudent, Student};
use crate::error::{ApiError, ApiResult};
use crate::routes::{normalize_email, required};
use crate::server::AppState;
use crate::services::StudentRecord;

#[derive(Debug, Deserialize)]
pub struct RegisterStudentRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub jmbag: String,
    pub year_of_study: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessInstanceRequest {
    pub process_instance_id: Option<String>,
}

/// Register a student: mirrored into the record store first, then stored
/// locally with the id the record store assigned.
pub async fn register_student(
    State(state): State<AppState>,
    Json(payload): Json<RegisterStudentRequest>,
) -> ApiResult<(StatusCode, Json<Student>)> {
    let name = required("name", &payload.name)?;
    let surname = required("surname", &payload.surname)?;
    let jmbag = required("jmbag", &payload.jmbag)?;
    let year_of_study = required("year_of_study", &payload.year_of_study)?;
    let email = normalize_email(&payload.email)?;
    if payload.password.trim().is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".to_string()));
    }

    let existing = state
        .repo
        .find_user_by_email(&email)
        .await
        .map_err(|e| ApiError::internal("Error adding student to the database", e))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }
    let jmbag_taken = state
        .repo
        .jmbag_taken(&jmbag)
        .await
        .map_err(|e| ApiError::internal("Error adding student to the database", e))?;
    if jmbag_taken {
        return Err(ApiError::Conflict("JMBAG already registered".to_string()));
    }

    let password_hash = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("Error hashing password", e))?;

    let record = StudentRecord {
        name: name.clone(),
        surname: surname.clone(),
        jmbag: jmbag.clone(),
        email: email.clone(),
        year_of_study: year_of_study.clone(),
    };
    let baserow_id = state
        .record_store
        .create_student(&record)
        .await
        .map_err(|e| ApiError::internal("Error adding student to the record store", e))?;

    let student = state
        .repo
        .insert_student(NewStudent {
            name,
            surname,
            email,
            password_hash,
            jmbag,
            year_of_study,
            baserow_id,
        })
        .await
        .map_err(|e| ApiError::internal("Error adding student to the database", e))?;

    tracing::info!(
        "Registered student {} (record store row {})",
        student.user.id,
        student.baserow_id
    );
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn update_process_instance(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<ProcessInstanceRequest>,
) -> ApiResult<Json<Student>> {
    auth_user.require_student()?;

    let instance = payload
        .process_instance_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let student = state
        .repo
        .set_process_instance(auth_user.id, instance)
        .await
        .map_err(|e| ApiError::internal("Error updating process instance", e))?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    tracing::info!(
        "Student {} process instance set to {:?}",
        student.user.id,
        student.process_instance_id
    );
    Ok(Json(student))
}

pub fn create_student_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/students/process-instance", patch(update_process_instance))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            AuthMiddleware::validate_token,
        ));

    Router::new()
        .route("/students", post(register_student))
        .merge(protected)
}
