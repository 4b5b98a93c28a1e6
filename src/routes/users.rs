//! User routes: profile, directory, account changes, messaging and conversations

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::AuthMiddleware;
use crate::auth::models::AuthUser;
use crate::auth::password::{hash_password, verify_password};
use crate::database::models::{
    AccountType, Admin, Conversation, ConversationStatus, Message, Student, User, UserSummary,
};
use crate::error::{ApiError, ApiResult};
use crate::routes::required;
use crate::server::AppState;
use crate::services::RemoteRow;

/// Full profile of the caller
#[derive(Serialize)]
#[serde(untagged)]
pub enum Profile {
    Student(Student),
    Admin(Admin),
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct AvatarRequest {
    pub avatar: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: i32,
    pub content: String,
}

#[derive(Serialize)]
pub struct SentMessage {
    pub message: Message,
    pub conversation: Conversation,
}

#[derive(Deserialize)]
pub struct StartConversationRequest {
    pub participant_id: i32,
}

#[derive(Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: ConversationStatus,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Profile>> {
    let profile = match auth_user.account_type {
        AccountType::Student => state
            .repo
            .find_student(auth_user.id)
            .await
            .map_err(|e| ApiError::internal("Error loading profile", e))?
            .map(Profile::Student),
        AccountType::Admin => state
            .repo
            .find_admin(auth_user.id)
            .await
            .map_err(|e| ApiError::internal("Error loading profile", e))?
            .map(Profile::Admin),
    };

    profile
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = state
        .repo
        .list_users()
        .await
        .map_err(|e| ApiError::internal("Error listing users", e))?;
    Ok(Json(users))
}

pub async fn companies(State(state): State<AppState>) -> ApiResult<Json<Vec<RemoteRow>>> {
    let companies = state
        .record_store
        .list_companies()
        .await
        .map_err(|e| ApiError::internal("Error fetching companies from the record store", e))?;
    Ok(Json(companies))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    if payload.new_password.trim().is_empty() {
        return Err(ApiError::BadRequest("new_password must not be empty".to_string()));
    }

    let user = state
        .repo
        .find_user_by_id(auth_user.id)
        .await
        .map_err(|e| ApiError::internal("Error loading user", e))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !verify_password(&payload.current_password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let password_hash = hash_password(&payload.new_password)
        .map_err(|e| ApiError::internal("Error hashing password", e))?;
    state
        .repo
        .update_password(user.id, &password_hash)
        .await
        .map_err(|e| ApiError::internal("Error updating password", e))?;

    tracing::info!("User {} changed their password", user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_own_avatar(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<AvatarRequest>,
) -> ApiResult<Json<User>> {
    let avatar = required("avatar", &payload.avatar)?;
    state
        .repo
        .update_avatar(auth_user.id, &avatar)
        .await
        .map_err(|e| ApiError::internal("Error updating avatar", e))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Make sure `user_id` exists, or answer 404.
async fn ensure_user(state: &AppState, user_id: i32) -> ApiResult<()> {
    state
        .repo
        .find_user_by_id(user_id)
        .await
        .map_err(|e| ApiError::internal("Error looking up user", e))?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound(format!("User {user_id} not found")))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<SentMessage>)> {
    let content = required("content", &payload.content)?;
    if payload.receiver_id == auth_user.id {
        return Err(ApiError::BadRequest("Cannot send a message to yourself".to_string()));
    }
    ensure_user(&state, payload.receiver_id).await?;

    let (message, conversation) = state
        .repo
        .send_message(auth_user.id, payload.receiver_id, &content)
        .await
        .map_err(|e| ApiError::internal("Error sending message", e))?;

    tracing::debug!(
        "Message {} from {} to {} in conversation {}",
        message.id,
        message.sender_id,
        message.receiver_id,
        conversation.id
    );
    Ok((StatusCode::CREATED, Json(SentMessage { message, conversation })))
}

pub async fn messages_with(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<i32>,
) -> ApiResult<Json<Vec<Message>>> {
    ensure_user(&state, user_id).await?;
    let messages = state
        .repo
        .messages_between(auth_user.id, user_id)
        .await
        .map_err(|e| ApiError::internal("Error fetching messages", e))?;
    Ok(Json(messages))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state
        .repo
        .conversations_for(auth_user.id)
        .await
        .map_err(|e| ApiError::internal("Error fetching conversations", e))?;
    Ok(Json(conversations))
}

pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<StartConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    if payload.participant_id == auth_user.id {
        return Err(ApiError::BadRequest(
            "Cannot start a conversation with yourself".to_string(),
        ));
    }
    ensure_user(&state, payload.participant_id).await?;

    let conversation = state
        .repo
        .open_conversation(auth_user.id, payload.participant_id)
        .await
        .map_err(|e| ApiError::internal("Error starting conversation", e))?;
    Ok(Json(conversation))
}

/// Load a conversation the caller takes part in: 404 when unknown, 403 otherwise.
async fn own_conversation(state: &AppState, id: i32, auth_user: &AuthUser) -> ApiResult<Conversation> {
    let conversation = state
        .repo
        .find_conversation(id)
        .await
        .map_err(|e| ApiError::internal("Error fetching conversation", e))?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    if !conversation.involves(auth_user.id) {
        return Err(ApiError::Forbidden(
            "Not a participant in this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Conversation>> {
    own_conversation(&state, id, &auth_user).await?;
    state
        .repo
        .mark_conversation_read(id, auth_user.id)
        .await
        .map_err(|e| ApiError::internal("Error updating read marker", e))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))
}

pub async fn set_active(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<ActiveRequest>,
) -> ApiResult<Json<Conversation>> {
    own_conversation(&state, id, &auth_user).await?;
    state
        .repo
        .set_conversation_active(id, auth_user.id, payload.active)
        .await
        .map_err(|e| ApiError::internal("Error updating conversation", e))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<StatusRequest>,
) -> ApiResult<Json<Conversation>> {
    own_conversation(&state, id, &auth_user).await?;
    state
        .repo
        .set_conversation_status(id, payload.status)
        .await
        .map_err(|e| ApiError::internal("Error updating conversation", e))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))
}

pub fn create_user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(me))
        .route("/users/companies", get(companies))
        .route("/users/password", patch(change_password))
        .route("/users/avatar", patch(update_own_avatar))
        .route("/users/messages", post(send_message))
        .route("/users/messages/{user_id}", get(messages_with))
        .route(
            "/users/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route("/users/conversations/{id}/read", patch(mark_read))
        .route("/users/conversations/{id}/active", patch(set_active))
        .route("/users/conversations/{id}/status", patch(set_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            AuthMiddleware::validate_token,
        ))
}
