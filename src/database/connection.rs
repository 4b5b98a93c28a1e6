// Database Connection Management
//
// Handles PostgreSQL connection pooling using tokio-postgres and deadpool.
use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use native_tls::TlsConnector;
use percent_encoding::percent_decode_str;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::config::parse_or;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub max_size: usize,
    /// Connect over TLS (native-tls)
    pub ssl: bool,
    pub timeouts: deadpool_postgres::Timeouts,
}

fn default_timeouts() -> deadpool_postgres::Timeouts {
    deadpool_postgres::Timeouts {
        wait: Some(Duration::from_secs(30)),
        create: Some(Duration::from_secs(30)),
        recycle: Some(Duration::from_secs(30)),
    }
}

/// URL userinfo stays percent-encoded after parsing
fn decode_credential(what: &str, raw: &str) -> Result<String> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .with_context(|| format!("Database URL {what} is not valid UTF-8"))?;
    Ok(decoded.into_owned())
}

impl DatabaseConfig {
    /// Create configuration from database URL
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url).context("Failed to parse database URL")?;

        if parsed.scheme() != "postgresql" && parsed.scheme() != "postgres" {
            anyhow::bail!("Invalid database URL scheme, expected postgresql or postgres");
        }

        let ssl = parsed
            .query_pairs()
            .any(|(key, value)| key == "sslmode" && value != "disable");

        Ok(Self {
            host: parsed.host_str().unwrap_or("localhost").to_string(),
            port: parsed.port().unwrap_or(5432),
            user: decode_credential("user name", parsed.username())?,
            password: decode_credential("password", parsed.password().unwrap_or(""))?,
            dbname: parsed.path().trim_start_matches('/').to_string(),
            max_size: 16,
            ssl,
            timeouts: default_timeouts(),
        })
    }

    /// Create configuration from a key/value source.
    ///
    /// `DATABASE_URL` wins when present, otherwise the discrete `DB_*` keys
    /// are required.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("{key} must be set in the environment"))
        };

        let mut config = match lookup("DATABASE_URL") {
            Some(url) => Self::from_url(&url)?,
            None => Self {
                host: required("DB_HOSTNAME")?,
                port: parse_or(lookup, "DB_PORT", 5432)?,
                user: required("DB_USERNAME")?,
                password: required("DB_PASSWORD")?,
                dbname: required("DB_NAME")?,
                max_size: 16,
                ssl: false,
                timeouts: default_timeouts(),
            },
        };

        config.max_size = parse_or(lookup, "DB_MAX_CONNECTIONS", config.max_size)?;
        config.ssl = parse_or(lookup, "DB_SSL", config.ssl)?;
        Ok(config)
    }
}

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pub(crate) pool: Pool,
}

impl DatabaseConnection {
    /// Create a new database connection with the provided configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let masked_host = format!("{}:{}/{}", config.host, config.port, config.dbname);
        tracing::info!("🔌 Connecting to database: {}", masked_host);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.dbname(&config.dbname);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = if config.ssl {
            let tls_connector = TlsConnector::builder()
                .build()
                .context("Failed to build TLS connector")?;
            Manager::from_config(pg_config, MakeTlsConnector::new(tls_connector), mgr_config)
        } else {
            Manager::from_config(pg_config, NoTls, mgr_config)
        };

        let pool = Pool::builder(mgr)
            .max_size(config.max_size)
            .wait_timeout(config.timeouts.wait)
            .create_timeout(config.timeouts.create)
            .recycle_timeout(config.timeouts.recycle)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .context("Failed to create database pool")?;

        let connection = Self { pool };
        connection.health_check().await?;

        tracing::info!("✅ Database connection established successfully");
        Ok(connection)
    }

    /// Run the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        crate::database::migrations::run_migrations(&self.pool).await
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection for health check")?;

        client
            .query("SELECT 1", &[])
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}
