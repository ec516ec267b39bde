//! Identity Core
//!
//! Account security and OAuth2 token issuance core providing:
//! - User registration and authentication
//! - Argon2id password hashing with transparent rehash on login
//! - Failed-attempt counting and account lockout
//! - Authorization-code, client-credentials, and refresh-token grants
//! - Signed access, refresh, and identity tokens with configurable lifetimes
//! - In-process domain-event dispatch for account lifecycle side effects
//!
//! HTTP routing, dependency-injection wiring, and the persistence engine are
//! external collaborators: the crate exposes plain service types plus the
//! [`store::AccountStore`], [`store::TokenStore`], and [`store::ClientStore`]
//! traits for a storage backend to implement. In-memory reference stores are
//! included for tests and embedding.
//!
//! # Configuration
//!
//! All configuration is loaded from environment variables:
//! - `JWT_SECRET` - Secret key for signing tokens (required, min 32 chars)
//! - `JWT_ISSUER` / `JWT_AUDIENCE` - Token issuer and audience claims
//! - `ACCESS_TOKEN_LIFETIME` - Access token lifetime in seconds (default: 1800)
//! - `REFRESH_TOKEN_LIFETIME` - Refresh token lifetime in seconds (default: 604800)
//! - `IDENTITY_TOKEN_LIFETIME` - Identity token lifetime in seconds (default: 300)
//! - `MAX_FAILED_ATTEMPTS` - Failed logins before lockout (default: 5)
//! - `LOCKOUT_DURATION` - Lockout duration in seconds (default: 900)
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use identity_core::{
//!     AccountService, AuthConfig, EventBus, EventKind, RegisterRequest,
//!     TokenIssuer, TokenRequest, WelcomeNotifier,
//!     store::{MemoryAccountStore, MemoryClientStore, MemoryTokenStore},
//! };
//!
//! let config = AuthConfig::from_env();
//! config.validate()?;
//!
//! let mut events = EventBus::new();
//! events.subscribe(EventKind::AccountCreated, Arc::new(WelcomeNotifier));
//!
//! let accounts = Arc::new(MemoryAccountStore::new());
//! let tokens = Arc::new(MemoryTokenStore::new());
//! let clients = Arc::new(MemoryClientStore::new());
//!
//! let service = AccountService::new(
//!     accounts.clone(), tokens.clone(), Arc::new(events), &config)?;
//! let issuer = TokenIssuer::new(accounts, tokens, clients, config);
//!
//! let account = service
//!     .register(RegisterRequest { email: "a@x.com".into(), password: "Secret1!".into() })
//!     .await?;
//! let account = service.authenticate("a@x.com", "Secret1!").await?;
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod password;
pub mod service;
pub mod store;
pub mod tokens;

// Re-export commonly used types
pub use account::{Account, ChangePasswordRequest, RegisterRequest};
pub use config::AuthConfig;
pub use error::{AuthError, ErrorBody};
pub use events::{DomainEvent, EventBus, EventHandler, EventKind, WelcomeNotifier};
pub use password::{PasswordCredential, VerifyOutcome};
pub use service::AccountService;
pub use tokens::{
    AccessTokenClaims, Client, TokenIssuer, TokenRequest, TokenRequestBody, TokenResponse,
};
