//! Account Service
//!
//! Use-case layer over the account aggregate: registration, authentication
//! with adaptive rehash and lockout policy, password change, and deletion.
//! The aggregate counts failures; this layer decides when the count crosses
//! the configured threshold and for how long the account stays locked.

use std::sync::Arc;

use chrono::{Duration, Utc};
use validator::Validate;

use crate::account::{Account, ChangePasswordRequest, RegisterRequest};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::events::{DomainEvent, EventBus};
use crate::password::{PasswordCredential, VerifyOutcome};
use crate::store::{AccountStore, TokenStore};

/// Bounded retries for the failed-attempt read-modify-write. Conflicts only
/// come from concurrent attempts against the same account, so a handful of
/// reloads is always enough to land the increment.
const FAILURE_UPDATE_RETRIES: u32 = 8;

/// Orchestrates account lifecycle operations
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<dyn TokenStore>,
    events: Arc<EventBus>,
    credentials: PasswordCredential,
    max_failed_attempts: u32,
    lockout_duration: Duration,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenStore>,
        events: Arc<EventBus>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            accounts,
            tokens,
            events,
            credentials: PasswordCredential::new(config)?,
            max_failed_attempts: config.max_failed_attempts,
            lockout_duration: Duration::seconds(config.lockout_duration),
        })
    }

    pub fn credentials(&self) -> &PasswordCredential {
        &self.credentials
    }

    /// Register a new account.
    ///
    /// Publishes `AccountCreated` after the account is persisted; a failing
    /// subscriber fails the call even though the account already exists.
    pub async fn register(&self, request: RegisterRequest) -> Result<Account, AuthError> {
        request.validate()?;
        self.credentials.validate_strength(&request.password)?;

        let email = normalize_email(&request.email);
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailExists);
        }

        let password_hash = self.credentials.hash(&request.password)?;
        let account = Account::new(email, password_hash)?;
        let account = self.accounts.insert(account).await?;

        tracing::info!(account_id = %account.id(), email = %account.email(), "Account registered");

        self.events
            .publish(&DomainEvent::AccountCreated {
                account_id: account.id(),
                email: account.email().to_string(),
                occurred_on: Utc::now(),
            })
            .await?;

        Ok(account)
    }

    /// Authenticate an email/password pair.
    ///
    /// An unknown email reports `InvalidCredentials`, same as a wrong
    /// password, so callers cannot enumerate accounts. A lockout whose
    /// deadline has passed is cleared here before the password is even
    /// looked at; the stored deadline does not expire by itself.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let email = normalize_email(email);
        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let now = Utc::now();

        if account.lockout_end().is_some() && !account.is_locked_out(now) {
            account.unlock();
            account = self.accounts.update(&account).await?;
        }

        if let Some(remaining) = account.lockout_remaining(now) {
            return Err(AuthError::AccountLocked {
                retry_after_secs: remaining.num_seconds().max(1),
            });
        }

        match self.credentials.verify(account.password_hash(), password)? {
            VerifyOutcome::Mismatch => {
                self.record_failure(account).await?;
                Err(AuthError::InvalidCredentials)
            }
            outcome => {
                account.record_successful_login();
                if outcome == VerifyOutcome::MatchNeedsRehash {
                    // Transparent migration off the aging hash parameters.
                    account.set_password_hash(self.credentials.hash(password)?);
                    tracing::info!(account_id = %account.id(), "Password hash upgraded on login");
                }
                let account = self.accounts.update(&account).await?;
                Ok(account)
            }
        }
    }

    /// Change the password after re-verifying the current one.
    ///
    /// All refresh tokens for the account are revoked on success.
    pub async fn change_password(
        &self,
        email: &str,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        request.validate()?;

        let email = normalize_email(email);
        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if self
            .credentials
            .verify(account.password_hash(), &request.current_password)?
            == VerifyOutcome::Mismatch
        {
            return Err(AuthError::InvalidCredentials);
        }

        self.credentials.validate_strength(&request.new_password)?;

        account.set_password_hash(self.credentials.hash(&request.new_password)?);
        self.accounts.update(&account).await?;
        self.tokens.revoke_all_for_account(account.id()).await?;

        tracing::info!(account_id = %account.id(), "Password changed");
        Ok(())
    }

    /// Delete an account and revoke its refresh tokens.
    pub async fn delete(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        self.accounts.delete(account.id()).await?;
        self.tokens.revoke_all_for_account(account.id()).await?;

        tracing::info!(account_id = %account.id(), "Account deleted");
        Ok(())
    }

    /// Persist a failed attempt, locking when the threshold is reached.
    ///
    /// Concurrent attempts against the same account race on the version
    /// check; a conflict reloads the latest state and reapplies the
    /// increment so no failure goes uncounted.
    async fn record_failure(&self, mut account: Account) -> Result<(), AuthError> {
        for _ in 0..FAILURE_UPDATE_RETRIES {
            account.record_failed_attempt();
            if account.access_failed_count() >= self.max_failed_attempts {
                account.lock_out(self.lockout_duration);
                tracing::warn!(
                    account_id = %account.id(),
                    failed_attempts = account.access_failed_count(),
                    "Account locked out after repeated failures"
                );
            }

            match self.accounts.update(&account).await {
                Ok(_) => return Ok(()),
                Err(AuthError::VersionConflict) => {
                    account = self
                        .accounts
                        .find_by_id(account.id())
                        .await?
                        .ok_or(AuthError::AccountNotFound)?;
                }
                Err(err) => return Err(err),
            }
        }

        Err(AuthError::VersionConflict)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventHandler, EventKind};
    use crate::store::{MemoryAccountStore, MemoryTokenStore};
    use crate::tokens::RefreshTokenRecord;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

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

    struct Fixture {
        accounts: Arc<MemoryAccountStore>,
        tokens: Arc<MemoryTokenStore>,
        service: AccountService,
    }

    fn fixture_with(config: AuthConfig, events: EventBus) -> Fixture {
        let accounts = Arc::new(MemoryAccountStore::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let service = AccountService::new(
            accounts.clone(),
            tokens.clone(),
            Arc::new(events),
            &config,
        )
        .unwrap();
        Fixture {
            accounts,
            tokens,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(test_config(), EventBus::new())
    }

    fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let fixture = fixture();

        let registered = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();
        assert_eq!(registered.email(), "a@x.com");

        let authenticated = fixture
            .service
            .authenticate("a@x.com", "Secret1!")
            .await
            .unwrap();
        assert_eq!(authenticated.id(), registered.id());
        assert!(authenticated.last_login_at().is_some());
        assert_eq!(authenticated.access_failed_count(), 0);
    }

    #[tokio::test]
    async fn register_normalizes_email() {
        let fixture = fixture();
        let account = fixture
            .service
            .register(register_request("  User@X.Com ", "Secret1!"))
            .await
            .unwrap();
        assert_eq!(account.email(), "user@x.com");

        assert!(fixture.service.authenticate("user@x.com", "Secret1!").await.is_ok());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let fixture = fixture();
        fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        let err = fixture
            .service
            .register(register_request("a@x.com", "Other2??"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let fixture = fixture();

        let err = fixture
            .service
            .register(register_request("not-an-email", "Secret1!"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = fixture
            .service
            .register(register_request("a@x.com", "alllowercase1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword));
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<DomainEvent>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) -> Result<(), AuthError> {
            self.seen.lock().await.push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_publishes_account_created() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventBus::new();
        events.subscribe(EventKind::AccountCreated, Arc::new(Recorder { seen: seen.clone() }));
        let fixture = fixture_with(test_config(), events);

        let account = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        let DomainEvent::AccountCreated { account_id, email, .. } = &seen[0];
        assert_eq!(*account_id, account.id());
        assert_eq!(email, "a@x.com");
    }

    #[tokio::test]
    async fn unknown_email_reports_invalid_credentials() {
        let fixture = fixture();
        let err = fixture
            .service
            .authenticate("ghost@x.com", "Secret1!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn wrong_password_increments_failure_count() {
        let fixture = fixture();
        let account = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        let err = fixture
            .service
            .authenticate("a@x.com", "Wrong1!!")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let stored = fixture
            .accounts
            .find_by_id(account.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_failed_count(), 1);
        assert!(!stored.is_locked_out(Utc::now()));
    }

    #[tokio::test]
    async fn lockout_after_threshold_blocks_correct_password() {
        let fixture = fixture();
        fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        for _ in 0..5 {
            let err = fixture
                .service
                .authenticate("a@x.com", "Wrong1!!")
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        // Sixth attempt with the right password still fails while locked.
        let err = fixture
            .service
            .authenticate("a@x.com", "Secret1!")
            .await
            .unwrap_err();
        match err {
            AuthError::AccountLocked { retry_after_secs } => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 900);
            }
            other => panic!("expected AccountLocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn expired_lockout_is_cleared_on_next_attempt() {
        let fixture = fixture();
        let account = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        // Plant an already-expired lockout with a non-zero failure count.
        let mut stored = fixture
            .accounts
            .find_by_id(account.id())
            .await
            .unwrap()
            .unwrap();
        stored.record_failed_attempt();
        stored.record_failed_attempt();
        stored.lock_out(Duration::seconds(-5));
        fixture.accounts.update(&stored).await.unwrap();

        let authenticated = fixture
            .service
            .authenticate("a@x.com", "Secret1!")
            .await
            .unwrap();
        assert_eq!(authenticated.access_failed_count(), 0);
        assert!(authenticated.lockout_end().is_none());
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() {
        let fixture = fixture();
        let account = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        let service = Arc::new(fixture.service);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.authenticate("a@x.com", "Wrong1!!").await
            }));
        }
        for handle in handles {
            // Every attempt loses, either on the password or on the lock.
            assert!(handle.await.unwrap().is_err());
        }

        let stored = fixture
            .accounts
            .find_by_id(account.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_failed_count(), 5);
        assert!(stored.is_locked_out(Utc::now()));
    }

    #[tokio::test]
    async fn aging_hash_is_upgraded_on_login() {
        let config = test_config();
        let fixture = fixture();

        // Hash produced under weaker parameters than the service is
        // configured with.
        let weak_credential = PasswordCredential::new(&AuthConfig {
            argon2_memory_cost: 512,
            ..config
        })
        .unwrap();
        let old_hash = weak_credential.hash("Secret1!").unwrap();
        let account = Account::new("a@x.com", old_hash.clone()).unwrap();
        let account = fixture.accounts.insert(account).await.unwrap();

        fixture
            .service
            .authenticate("a@x.com", "Secret1!")
            .await
            .unwrap();

        let stored = fixture
            .accounts
            .find_by_id(account.id())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.password_hash(), old_hash);
        assert_eq!(
            fixture
                .service
                .credentials()
                .verify(stored.password_hash(), "Secret1!")
                .unwrap(),
            VerifyOutcome::Match
        );
    }

    #[tokio::test]
    async fn change_password_requires_current_and_revokes_tokens() {
        let fixture = fixture();
        let account = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        fixture
            .tokens
            .put_refresh_token(RefreshTokenRecord {
                id: Uuid::new_v4(),
                token_hash: "hash".to_string(),
                account_id: account.id(),
                client_id: "client".to_string(),
                issued_at: Utc::now(),
                expires_at: Utc::now() + Duration::days(7),
                revoked_at: None,
            })
            .await
            .unwrap();

        let err = fixture
            .service
            .change_password(
                "a@x.com",
                ChangePasswordRequest {
                    current_password: "Wrong1!!".to_string(),
                    new_password: "Fresh2??".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        fixture
            .service
            .change_password(
                "a@x.com",
                ChangePasswordRequest {
                    current_password: "Secret1!".to_string(),
                    new_password: "Fresh2??".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(fixture.service.authenticate("a@x.com", "Fresh2??").await.is_ok());
        assert!(fixture
            .tokens
            .get_refresh_token("hash")
            .await
            .unwrap()
            .unwrap()
            .revoked_at
            .is_some());
    }

    #[tokio::test]
    async fn delete_removes_account_and_revokes_tokens() {
        let fixture = fixture();
        let account = fixture
            .service
            .register(register_request("a@x.com", "Secret1!"))
            .await
            .unwrap();

        fixture
            .tokens
            .put_refresh_token(RefreshTokenRecord {
                id: Uuid::new_v4(),
                token_hash: "hash".to_string(),
                account_id: account.id(),
                client_id: "client".to_string(),
                issued_at: Utc::now(),
                expires_at: Utc::now() + Duration::days(7),
                revoked_at: None,
            })
            .await
            .unwrap();

        fixture.service.delete("a@x.com").await.unwrap();

        assert!(matches!(
            fixture.service.delete("a@x.com").await.unwrap_err(),
            AuthError::AccountNotFound
        ));
        assert!(matches!(
            fixture
                .service
                .authenticate("a@x.com", "Secret1!")
                .await
                .unwrap_err(),
            AuthError::InvalidCredentials
        ));
        assert!(fixture
            .tokens
            .get_refresh_token("hash")
            .await
            .unwrap()
            .unwrap()
            .revoked_at
            .is_some());
    }
}
