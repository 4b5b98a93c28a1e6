use axum::response::Json;
use serde_json::json;

/// Service banner.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/`
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "msg": "Internship Gateway API - Running" }))
}

/// Health check endpoint handler.
///
/// Used by load balancers and container probes; does not touch the database
/// or the external services.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
/// - **Response**: `{"status": "pong"}`
pub async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "pong" }))
}
