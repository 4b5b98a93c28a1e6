//! # Authentication Module
//!
//! Password hashing, JWT issuance and validation, and the middleware that
//! secures the API endpoints.

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
