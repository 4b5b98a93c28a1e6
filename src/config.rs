//! Configuration module for environment variables and application settings

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use jsonwebtoken::Algorithm;

use crate::database::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener and CORS configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Token signing and lifetimes
    pub auth: AuthConfig,

    /// Outbound record-store and workflow-engine connectors
    pub services: ServicesConfig,

    /// Error-reporting API key (BUGSNAG)
    pub error_reporting_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub remember_me_expire_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub record_store_url: String,
    pub workflow_engine_url: String,
    pub students_table: String,
    /// Companies offered to students
    pub companies_table: String,
    /// Companies as administrators manage them
    pub admin_companies_table: String,
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT").or_else(|| lookup("SERVER_PORT")) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("PORT must be a valid port number, got {raw:?}"))?,
            None => 9001,
        };

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(raw) => parse_cors_origins(&raw)?,
            None => Vec::new(),
        };

        let algorithm_name = lookup("ALGORITHM").unwrap_or_else(|| "HS256".to_string());
        let algorithm = Algorithm::from_str(algorithm_name.trim())
            .map_err(|_| anyhow!("ALGORITHM {algorithm_name:?} is not a known JWT algorithm"))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(anyhow!(
                "ALGORITHM {algorithm_name:?} is not supported, use HS256, HS384 or HS512"
            ));
        }

        Ok(Self {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                cors_origins,
            },

            database: DatabaseConfig::from_lookup(&lookup)?,

            auth: AuthConfig {
                secret_key: lookup("SECRET_KEY")
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| anyhow!("SECRET_KEY environment variable is required"))?,
                algorithm,
                access_token_expire_minutes: parse_or(&lookup, "ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
                remember_me_expire_minutes: parse_or(&lookup, "REMEMBER_ME_EXPIRE_MINUTES", 10_080)?,
            },

            services: ServicesConfig {
                record_store_url: base_url(&lookup, "RECORD_STORE_URL", "http://localhost:8080"),
                workflow_engine_url: base_url(&lookup, "WORKFLOW_ENGINE_URL", "http://localhost:9000"),
                students_table: lookup("RECORD_STORE_STUDENTS_TABLE")
                    .unwrap_or_else(|| "studenti".to_string()),
                companies_table: lookup("RECORD_STORE_COMPANIES_TABLE")
                    .unwrap_or_else(|| "poslodavci".to_string()),
                admin_companies_table: lookup("RECORD_STORE_ADMIN_COMPANIES_TABLE")
                    .unwrap_or_else(|| "firme".to_string()),
                request_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 10)?),
            },

            error_reporting_key: lookup("BUGSNAG").filter(|key| !key.is_empty()),
        })
    }
}

/// Comma-separated origins; empty or a lone `*` means any origin.
fn parse_cors_origins(raw: &str) -> Result<Vec<String>> {
    let origins: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .collect();

    if origins.contains(&"*") {
        if origins.len() > 1 {
            return Err(anyhow!(
                "CORS_ORIGINS mixes \"*\" with explicit origins, use one or the other: {raw:?}"
            ));
        }
        return Ok(Vec::new());
    }
    Ok(origins.into_iter().map(str::to_string).collect())
}

/// Parse an optional numeric key, falling back to `default` when unset.
pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

fn base_url<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
