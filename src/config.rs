//! Configuration
//!
//! All configuration values are loaded from environment variables.
//! No hardcoded secrets or sensitive data.

use crate::error::AuthError;
use std::env;

/// Core configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for signing tokens (from JWT_SECRET env var)
    pub jwt_secret: String,

    /// Token issuer claim (from JWT_ISSUER env var)
    pub jwt_issuer: String,

    /// Token audience claim (from JWT_AUDIENCE env var)
    pub jwt_audience: String,

    /// Access token lifetime in seconds (from ACCESS_TOKEN_LIFETIME env var)
    pub access_token_lifetime: i64,

    /// Refresh token lifetime in seconds (from REFRESH_TOKEN_LIFETIME env var)
    pub refresh_token_lifetime: i64,

    /// Identity token lifetime in seconds (from IDENTITY_TOKEN_LIFETIME env var)
    pub identity_token_lifetime: i64,

    /// Authorization code lifetime in seconds (from AUTH_CODE_LIFETIME env var)
    pub auth_code_lifetime: i64,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost, iterations (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Failed login attempts before lockout (from MAX_FAILED_ATTEMPTS env var)
    pub max_failed_attempts: u32,

    /// Account lockout duration in seconds (from LOCKOUT_DURATION env var)
    pub lockout_duration: i64,

    /// Minimum password length (from MIN_PASSWORD_LENGTH env var)
    pub min_password_length: usize,
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// # Panics
    /// Panics if the JWT_SECRET environment variable is not set
    pub fn from_env() -> Self {
        Self {
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET environment variable must be set"),

            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "identity-core".to_string()),

            jwt_audience: env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "identity-core-api".to_string()),

            access_token_lifetime: env::var("ACCESS_TOKEN_LIFETIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800), // 30 minutes

            refresh_token_lifetime: env::var("REFRESH_TOKEN_LIFETIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(604800), // 7 days

            identity_token_lifetime: env::var("IDENTITY_TOKEN_LIFETIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300), // 5 minutes

            auth_code_lifetime: env::var("AUTH_CODE_LIFETIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),

            argon2_memory_cost: env::var("ARGON2_MEMORY_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(65536), // 64 MiB

            argon2_time_cost: env::var("ARGON2_TIME_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            argon2_parallelism: env::var("ARGON2_PARALLELISM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),

            max_failed_attempts: env::var("MAX_FAILED_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            lockout_duration: env::var("LOCKOUT_DURATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900), // 15 minutes

            min_password_length: env::var("MIN_PASSWORD_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        if self.access_token_lifetime <= 0 {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_LIFETIME must be positive".to_string(),
            ));
        }

        if self.refresh_token_lifetime <= self.access_token_lifetime {
            return Err(AuthError::Config(
                "REFRESH_TOKEN_LIFETIME must be greater than ACCESS_TOKEN_LIFETIME".to_string(),
            ));
        }

        if self.auth_code_lifetime <= 0 {
            return Err(AuthError::Config(
                "AUTH_CODE_LIFETIME must be positive".to_string(),
            ));
        }

        if self.max_failed_attempts == 0 {
            return Err(AuthError::Config(
                "MAX_FAILED_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.lockout_duration <= 0 {
            return Err(AuthError::Config(
                "LOCKOUT_DURATION must be positive".to_string(),
            ));
        }

        if self.min_password_length < 8 {
            return Err(AuthError::Config(
                "MIN_PASSWORD_LENGTH must be at least 8".to_string(),
            ));
        }

        Ok(())
    }
}
