//! JWT Token Service
//!
//! Handles JWT creation, validation, and claims management for user authentication.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

/// JWT Claims structure containing user information and token metadata
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id
    pub user_id: i32,
    /// User email
    pub user_email: String,
    /// Token issued at timestamp
    pub iat: i64,
    /// Token expiration timestamp
    pub exp: i64,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

/// JWT Service for token operations
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
    validation: Validation,
    access_lifetime: Duration,
    remember_me_lifetime: Duration,
}

impl JwtService {
    /// Create a new JWT service from the auth settings
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.secret_key.as_bytes();

        let mut validation = Validation::new(config.algorithm);
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            header: Header::new(config.algorithm),
            validation,
            access_lifetime: Duration::minutes(config.access_token_expire_minutes),
            remember_me_lifetime: Duration::minutes(config.remember_me_expire_minutes),
        }
    }

    /// Token lifetime for a login with or without "remember me"
    pub fn lifetime(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.remember_me_lifetime
        } else {
            self.access_lifetime
        }
    }

    /// Generate a JWT token for a user
    pub fn create_token(&self, user_id: i32, email: &str, remember_me: bool) -> Result<IssuedToken> {
        let now = Utc::now();
        let lifetime = self.lifetime(remember_me);

        let claims = Claims {
            user_id,
            user_email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        let token = encode(&self.header, &claims, &self.encoding_key)
            .context("Failed to encode JWT token")?;

        Ok(IssuedToken {
            token,
            expires_in: lifetime.num_seconds(),
        })
    }

    /// Validate and decode a JWT token
    pub fn decode_claims(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .context("Failed to validate JWT token")?;
        Ok(data.claims)
    }
}
