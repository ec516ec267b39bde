//! Account Aggregate
//!
//! The account owns its lockout state machine. All mutation goes through
//! named transitions; callers never write fields directly. The lockout flag
//! is derived from the lockout deadline at evaluation time, so a stored
//! boolean can never drift out of sync with the timestamp.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AuthError;

/// A user account
///
/// Two states: active (failure counter may be non-zero) and locked out
/// (lockout deadline in the future). A past deadline means the account is
/// no longer locked; it is the service's job to clear it on the next read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,
    email: String,
    #[serde(skip_serializing)]
    password_hash: String,
    lockout_end: Option<DateTime<Utc>>,
    access_failed_count: u32,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Account {
    /// Create a new account with a fresh id and creation timestamp.
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Result<Self, AuthError> {
        let email = email.into();
        let password_hash = password_hash.into();

        if email.trim().is_empty() {
            return Err(AuthError::Validation("email must not be empty".to_string()));
        }
        if password_hash.is_empty() {
            return Err(AuthError::Validation(
                "password hash must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            lockout_end: None,
            access_failed_count: 0,
            created_at: Utc::now(),
            last_login_at: None,
            version: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn lockout_end(&self) -> Option<DateTime<Utc>> {
        self.lockout_end
    }

    pub fn access_failed_count(&self) -> u32 {
        self.access_failed_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    /// Optimistic concurrency token, bumped by the store on every update.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the account is locked out as of `now`.
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        match self.lockout_end {
            Some(end) => end > now,
            None => false,
        }
    }

    /// Time left on an active lockout, `None` when not locked.
    pub fn lockout_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.lockout_end.filter(|end| *end > now).map(|end| end - now)
    }

    /// Count one failed login attempt.
    ///
    /// Whether the new count crosses the lockout threshold is policy, and
    /// policy lives in the service layer.
    pub fn record_failed_attempt(&mut self) {
        self.access_failed_count += 1;
    }

    /// Lock the account until `now + duration`.
    ///
    /// Calling this on an already-locked account overwrites the deadline.
    pub fn lock_out(&mut self, duration: Duration) {
        self.lockout_end = Some(Utc::now() + duration);
    }

    /// Clear any lockout and reset the failure counter.
    pub fn unlock(&mut self) {
        self.lockout_end = None;
        self.access_failed_count = 0;
    }

    /// Record a successful login.
    ///
    /// Does not unlock; the caller must have checked the lockout state
    /// before verifying the password.
    pub fn record_successful_login(&mut self) {
        self.last_login_at = Some(Utc::now());
        self.access_failed_count = 0;
    }

    /// Replace the stored password hash (rehash migration, password change).
    pub fn set_password_hash(&mut self, hash: String) {
        self.password_hash = hash;
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

// ============================================
// Request DTOs
// ============================================

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Change password request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new("user@example.com", "$argon2id$stub").unwrap()
    }

    #[test]
    fn new_account_starts_active() {
        let account = account();
        assert_eq!(account.access_failed_count(), 0);
        assert!(!account.is_locked_out(Utc::now()));
        assert!(account.lockout_end().is_none());
        assert!(account.last_login_at().is_none());
        assert_eq!(account.version(), 0);
    }

    #[test]
    fn rejects_empty_email_and_hash() {
        assert!(Account::new("", "hash").is_err());
        assert!(Account::new("   ", "hash").is_err());
        assert!(Account::new("user@example.com", "").is_err());
    }

    #[test]
    fn lockout_is_derived_from_deadline() {
        let mut account = account();
        account.lock_out(Duration::minutes(15));
        assert!(account.is_locked_out(Utc::now()));

        // A deadline in the past means not locked, without any state change.
        let after_expiry = Utc::now() + Duration::minutes(16);
        assert!(!account.is_locked_out(after_expiry));
        assert!(account.lockout_end().is_some());
    }

    #[test]
    fn lock_out_overwrites_existing_deadline() {
        let mut account = account();
        account.lock_out(Duration::minutes(1));
        let first = account.lockout_end().unwrap();
        account.lock_out(Duration::minutes(30));
        assert!(account.lockout_end().unwrap() > first);
    }

    #[test]
    fn unlock_resets_counter_and_deadline() {
        let mut account = account();
        account.record_failed_attempt();
        account.record_failed_attempt();
        account.lock_out(Duration::minutes(15));

        account.unlock();
        assert_eq!(account.access_failed_count(), 0);
        assert!(account.lockout_end().is_none());
    }

    #[test]
    fn unlock_is_idempotent() {
        let mut account = account();
        account.unlock();
        let snapshot = (account.access_failed_count(), account.lockout_end());
        account.unlock();
        assert_eq!(snapshot, (account.access_failed_count(), account.lockout_end()));
    }

    #[test]
    fn successful_login_resets_counter_but_not_lockout() {
        let mut account = account();
        account.record_failed_attempt();
        account.lock_out(Duration::minutes(15));

        account.record_successful_login();
        assert_eq!(account.access_failed_count(), 0);
        assert!(account.last_login_at().is_some());
        // Still locked: success recording does not unlock.
        assert!(account.is_locked_out(Utc::now()));
    }

    #[test]
    fn failed_attempts_accumulate() {
        let mut account = account();
        for expected in 1..=4u32 {
            account.record_failed_attempt();
            assert_eq!(account.access_failed_count(), expected);
        }
    }

    #[test]
    fn lockout_remaining_reports_time_left() {
        let mut account = account();
        assert!(account.lockout_remaining(Utc::now()).is_none());

        account.lock_out(Duration::minutes(15));
        let remaining = account.lockout_remaining(Utc::now()).unwrap();
        assert!(remaining.num_seconds() > 14 * 60);
        assert!(remaining.num_seconds() <= 15 * 60);
    }
}
