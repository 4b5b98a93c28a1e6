//! # Internship Gateway
//!
//! HTTP API in front of the internship-management system: authenticates
//! students and admins, keeps their local accounts and direct messages in
//! PostgreSQL, and proxies student/company records to the record-store
//! service and process instances to the workflow engine.
//!
//! ## Architecture
//! - `server`: router assembly, middleware stack and serve loop
//! - `config`: environment variable configuration
//! - `auth`: JWT issuing/validation, password hashing, auth middleware
//! - `database`: connection pool, migrations, repository
//! - `services`: record-store and workflow-engine connectors, roster merge
//! - `routes`: HTTP handlers grouped by resource
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and fill in the database and secret settings:
//! ```bash
//! cp .env.example .env
//! ```
//!
//! ## Health Check
//! ```bash
//! curl http://localhost:9001/ping
//! ```

mod auth;
mod config;
mod database;
mod error;
mod routes;
mod server;
mod services;
#[cfg(test)]
mod test_support;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Application entry point.
///
/// Loads `.env`, initializes logging, reads the configuration and runs the
/// HTTP server until Ctrl+C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("internship_gateway=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    tracing::info!("🏁 Starting Internship Gateway...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "🏗️  Build profile: {}",
        if cfg!(debug_assertions) { "debug" } else { "release" }
    );

    let config = Config::from_env()?;
    match config.error_reporting_key {
        Some(_) => tracing::info!("Error reporting key configured"),
        None => tracing::info!("No error reporting key configured"),
    }

    server::start(config).await
}
