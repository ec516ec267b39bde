//! Password Credential
//!
//! Argon2id hashing and verification. Verification is three-way: a match
//! against a hash produced with outdated parameters reports
//! `MatchNeedsRehash` so the caller can migrate the stored hash without
//! failing the login. Verification itself never writes anything.

use argon2::{
    password_hash::{
        rand_core::OsRng, Error as HashError, PasswordHash, PasswordHasher, PasswordVerifier,
        SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Outcome of verifying a supplied password against a stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The password does not match.
    Mismatch,
    /// The password matches and the hash is current.
    Match,
    /// The password matches but the hash was produced with outdated
    /// algorithm, version, or cost parameters and should be replaced.
    MatchNeedsRehash,
}

/// Password hashing and verification with configured Argon2id parameters
#[derive(Debug, Clone)]
pub struct PasswordCredential {
    params: Params,
    min_password_length: usize,
}

impl PasswordCredential {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|_| AuthError::Config("invalid Argon2 parameters".to_string()))?;

        Ok(Self {
            params,
            min_password_length: config.min_password_length,
        })
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());

        let hash = argon2.hash_password(password.as_bytes(), &salt)?.to_string();
        Ok(hash)
    }

    /// Verify a supplied password against a stored hash.
    ///
    /// Verification uses the parameters embedded in the stored hash, so
    /// hashes produced under older settings still verify; they just come
    /// back as `MatchNeedsRehash`.
    pub fn verify(&self, stored_hash: &str, supplied: &str) -> Result<VerifyOutcome, AuthError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|err| {
            tracing::error!("Stored password hash is malformed: {:?}", err);
            AuthError::Internal
        })?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());

        match argon2.verify_password(supplied.as_bytes(), &parsed) {
            Ok(()) => {
                if self.needs_rehash(&parsed) {
                    Ok(VerifyOutcome::MatchNeedsRehash)
                } else {
                    Ok(VerifyOutcome::Match)
                }
            }
            Err(HashError::Password) => Ok(VerifyOutcome::Mismatch),
            Err(err) => Err(err.into()),
        }
    }

    /// Validate password strength: configured minimum length plus at least
    /// one uppercase letter, one lowercase letter, and one digit.
    pub fn validate_strength(&self, password: &str) -> Result<(), AuthError> {
        if password.len() < self.min_password_length {
            return Err(AuthError::WeakPassword);
        }

        let has_upper = password.chars().any(|c| c.is_uppercase());
        let has_lower = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if !has_upper || !has_lower || !has_digit {
            return Err(AuthError::WeakPassword);
        }

        Ok(())
    }

    fn needs_rehash(&self, parsed: &PasswordHash<'_>) -> bool {
        if parsed.algorithm.as_str() != "argon2id" {
            return true;
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return true;
        }
        match Params::try_from(parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low-cost parameters keep the tests fast.
    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            jwt_issuer: "test".to_string(),
            jwt_audience: "test".to_string(),
            access_token_lifetime: 1800,
            refresh_token_lifetime: 604800,
            identity_token_lifetime: 300,
            auth_code_lifetime: 300,
            argon2_memory_cost: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            max_failed_attempts: 5,
            lockout_duration: 900,
            min_password_length: 8,
        }
    }

    #[test]
    fn hash_then_verify_round_trip() {
        let credential = PasswordCredential::new(&test_config()).unwrap();
        let hash = credential.hash("Secret1!").unwrap();
        assert_eq!(credential.verify(&hash, "Secret1!").unwrap(), VerifyOutcome::Match);
    }

    #[test]
    fn wrong_password_is_mismatch() {
        let credential = PasswordCredential::new(&test_config()).unwrap();
        let hash = credential.hash("Secret1!").unwrap();
        assert_eq!(
            credential.verify(&hash, "Wrong1!!").unwrap(),
            VerifyOutcome::Mismatch
        );
    }

    #[test]
    fn hashes_are_salted() {
        let credential = PasswordCredential::new(&test_config()).unwrap();
        let first = credential.hash("Secret1!").unwrap();
        let second = credential.hash("Secret1!").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn downgraded_parameters_trigger_rehash() {
        let weak_config = AuthConfig {
            argon2_memory_cost: 512,
            ..test_config()
        };
        let weak = PasswordCredential::new(&weak_config).unwrap();
        let current = PasswordCredential::new(&test_config()).unwrap();

        let old_hash = weak.hash("Secret1!").unwrap();
        assert_eq!(
            current.verify(&old_hash, "Secret1!").unwrap(),
            VerifyOutcome::MatchNeedsRehash
        );

        // Wrong password still reported as mismatch, not rehash.
        assert_eq!(
            current.verify(&old_hash, "Wrong1!!").unwrap(),
            VerifyOutcome::Mismatch
        );
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let credential = PasswordCredential::new(&test_config()).unwrap();
        assert!(credential.verify("not-a-phc-string", "Secret1!").is_err());
    }

    #[test]
    fn strength_policy() {
        let credential = PasswordCredential::new(&test_config()).unwrap();
        assert!(credential.validate_strength("Secret1!").is_ok());
        assert!(credential.validate_strength("short1A").is_err());
        assert!(credential.validate_strength("alllowercase1").is_err());
        assert!(credential.validate_strength("ALLUPPERCASE1").is_err());
        assert!(credential.validate_strength("NoDigitsHere").is_err());
    }
}
