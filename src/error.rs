//! Error Types
//!
//! Centralized error taxonomy for account and token operations, plus the
//! OAuth2 wire-level error body for grant failures.

use serde::Serialize;

/// Errors produced by account and token operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked. Try again in {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: i64 },

    #[error("Account not found")]
    AccountNotFound,

    #[error("Email already registered")]
    EmailExists,

    #[error("Account was modified concurrently")]
    VersionConflict,

    #[error("Password does not meet requirements")]
    WeakPassword,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid grant: {0}")]
    InvalidGrant(&'static str),

    #[error("Invalid client credentials")]
    InvalidClient,

    #[error("The grant type is not supported")]
    UnsupportedGrantType,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

/// OAuth2 error response body (RFC 6749 §5.2)
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

impl AuthError {
    /// Machine-readable error code.
    ///
    /// Grant failures map onto the OAuth2 registry (`invalid_grant`,
    /// `invalid_client`, `unsupported_grant_type`); everything else uses
    /// internal codes. Authentication failures deliberately share one code
    /// so callers cannot distinguish an unknown account from a wrong
    /// password.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials | AuthError::AccountNotFound => "invalid_credentials",
            AuthError::AccountLocked { .. } => "account_locked",
            AuthError::EmailExists => "email_exists",
            AuthError::VersionConflict => "conflict",
            AuthError::WeakPassword => "weak_password",
            AuthError::Validation(_) => "validation_error",
            AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::InvalidClient => "invalid_client",
            AuthError::UnsupportedGrantType => "unsupported_grant_type",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Config(_) => "configuration_error",
            AuthError::Store(_) | AuthError::Internal => "internal_error",
        }
    }

    /// Wire-level error body for the token endpoint.
    ///
    /// Store and internal faults are not echoed back to clients.
    pub fn to_error_body(&self) -> ErrorBody {
        let description = match self {
            AuthError::Store(_) | AuthError::Internal => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error: self.error_code().to_string(),
            error_description: description,
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("JWT error: {:?}", err);
        AuthError::InvalidToken
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_errors_use_oauth_codes() {
        assert_eq!(AuthError::InvalidGrant("expired").error_code(), "invalid_grant");
        assert_eq!(AuthError::InvalidClient.error_code(), "invalid_client");
        assert_eq!(
            AuthError::UnsupportedGrantType.error_code(),
            "unsupported_grant_type"
        );
    }

    #[test]
    fn not_found_is_indistinguishable_from_bad_password() {
        assert_eq!(
            AuthError::AccountNotFound.error_code(),
            AuthError::InvalidCredentials.error_code()
        );
    }

    #[test]
    fn internal_details_are_not_echoed() {
        let body = AuthError::Store("connection refused".into()).to_error_body();
        assert_eq!(body.error, "internal_error");
        assert!(!body.error_description.contains("connection refused"));
    }
}
