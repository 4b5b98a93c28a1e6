//! # Server Module
//!
//! HTTP server setup and route configuration for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::jwt::JwtService;
use crate::config::{Config, ServerConfig};
use crate::database::{DatabaseConnection, Repository};
use crate::routes;
use crate::services::{BaserowConnector, BpmnEngineConnector, RecordStore, WorkflowEngine};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub record_store: Arc<dyn RecordStore>,
    pub workflow_engine: Arc<dyn WorkflowEngine>,
    pub jwt_service: Arc<JwtService>,
}

/// Assemble every route group around the shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health::root))
        .route("/ping", get(routes::health::ping))
        .merge(routes::auth::create_auth_routes())
        .merge(routes::users::create_user_routes(&state))
        .merge(routes::students::create_student_routes(&state))
        .merge(routes::admin::create_admin_routes(&state))
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    if config.cors_origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .allow_credentials(true))
}

/// Starts the gateway HTTP server.
///
/// Connects to PostgreSQL, applies migrations, wires the outbound connectors
/// and serves until Ctrl+C.
pub async fn start(config: Config) -> Result<()> {
    let db = DatabaseConnection::new(config.database.clone())
        .await
        .context("Failed to connect to DB")?;
    db.migrate().await?;

    let http_client = reqwest::Client::builder()
        .timeout(config.services.request_timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let state = AppState {
        repo: Arc::new(db),
        record_store: Arc::new(BaserowConnector::new(http_client.clone(), &config.services)),
        workflow_engine: Arc::new(BpmnEngineConnector::new(http_client, &config.services)),
        jwt_service: Arc::new(JwtService::new(&config.auth)),
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server)?),
    );

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST {:?}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address - port may already be in use")?;

    tracing::info!("🚀 Internship Gateway starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/ping", addr);
    tracing::info!("🗂️  Record store: {}", config.services.record_store_url);
    tracing::info!("⚙️  Workflow engine: {}", config.services.workflow_engine_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
