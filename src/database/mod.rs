//! # Database Module
//!
//! PostgreSQL persistence through tokio-postgres and a deadpool connection
//! pool. Includes connection management, models, migrations and the
//! [`Repository`] seam the handlers talk to.

pub mod connection;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod repository;

pub use connection::{DatabaseConfig, DatabaseConnection};
pub use repository::Repository;
