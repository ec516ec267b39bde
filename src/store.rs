//! Storage Collaborators
//!
//! Trait surface consumed by the service and token layers, kept free of any
//! storage engine. A production deployment supplies database-backed
//! implementations; the in-memory ones here serve tests and embedding
//! applications, and they enforce the same contract: optimistic concurrency
//! on account updates and atomic single-use redemption of authorization
//! codes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::account::Account;
use crate::error::AuthError;
use crate::tokens::{AuthorizationCodeRecord, Client, RefreshTokenRecord};

/// Durable account lookup and persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;

    /// Persist a new account. Fails with `EmailExists` when the email is
    /// already taken.
    async fn insert(&self, account: Account) -> Result<Account, AuthError>;

    /// Persist changes to an existing account.
    ///
    /// The stored version must match the caller's copy; a mismatch fails
    /// with `VersionConflict` and nothing is written. Returns the stored
    /// account with its version advanced.
    async fn update(&self, account: &Account) -> Result<Account, AuthError>;

    async fn delete(&self, id: Uuid) -> Result<(), AuthError>;

    async fn list_all(&self) -> Result<Vec<Account>, AuthError>;
}

/// Storage for authorization codes and refresh tokens
///
/// Codes and tokens are keyed by hash; the raw secret never reaches the
/// store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn put_code(&self, code: AuthorizationCodeRecord) -> Result<(), AuthError>;

    /// Redeem an authorization code: look it up and mark it used in one
    /// indivisible operation. Of two concurrent redemptions of the same
    /// code, exactly one receives the record.
    async fn consume_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCodeRecord>, AuthError>;

    async fn put_refresh_token(&self, token: RefreshTokenRecord) -> Result<(), AuthError>;

    async fn get_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Mark a refresh token revoked. Revoking an unknown or already-revoked
    /// token is a no-op.
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<(), AuthError>;

    /// Revoke every live refresh token belonging to an account.
    async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError>;
}

/// Registered OAuth2 client lookup
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, AuthError>;
}

// ============================================
// In-Memory Implementations
// ============================================

/// In-memory account store with optimistic concurrency
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.email() == email)
            .cloned())
    }

    async fn insert(&self, account: Account) -> Result<Account, AuthError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|existing| existing.email() == account.email()) {
            return Err(AuthError::EmailExists);
        }
        accounts.insert(account.id(), account.clone());
        Ok(account)
    }

    async fn update(&self, account: &Account) -> Result<Account, AuthError> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get_mut(&account.id())
            .ok_or(AuthError::AccountNotFound)?;

        if stored.version() != account.version() {
            return Err(AuthError::VersionConflict);
        }

        let mut updated = account.clone();
        updated.bump_version();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        self.accounts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AuthError::AccountNotFound)
    }

    async fn list_all(&self) -> Result<Vec<Account>, AuthError> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }
}

/// In-memory code and refresh-token store
#[derive(Default)]
pub struct MemoryTokenStore {
    codes: Mutex<HashMap<String, AuthorizationCodeRecord>>,
    refresh_tokens: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put_code(&self, code: AuthorizationCodeRecord) -> Result<(), AuthError> {
        self.codes.lock().await.insert(code.code_hash.clone(), code);
        Ok(())
    }

    async fn consume_code(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCodeRecord>, AuthError> {
        // Removal under the lock makes redemption single-use: a concurrent
        // second redemption observes the entry already gone.
        Ok(self.codes.lock().await.remove(code_hash))
    }

    async fn put_refresh_token(&self, token: RefreshTokenRecord) -> Result<(), AuthError> {
        self.refresh_tokens
            .lock()
            .await
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn get_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.refresh_tokens.lock().await.get(token_hash).cloned())
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<(), AuthError> {
        if let Some(token) = self.refresh_tokens.lock().await.get_mut(token_hash) {
            if token.revoked_at.is_none() {
                token.revoked_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<(), AuthError> {
        let now = Utc::now();
        for token in self.refresh_tokens.lock().await.values_mut() {
            if token.account_id == account_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
            }
        }
        Ok(())
    }
}

/// In-memory client registry, populated at wiring time
#[derive(Default)]
pub struct MemoryClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

impl MemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, client: Client) {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, AuthError> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }
}
