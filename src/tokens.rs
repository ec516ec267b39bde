//! Token Issuance
//!
//! Validates an OAuth2 grant, authenticates the principal or client behind
//! it, and mints signed, time-bounded tokens. Access and identity tokens
//! are HS256 JWTs; authorization codes and refresh tokens are opaque random
//! strings persisted by hash, with single-use codes and rotating refresh
//! tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::{AccountStore, ClientStore, TokenStore};

// ============================================
// Stored Records
// ============================================

/// A registered OAuth2 client
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub client_secret: String,
    pub display_name: String,
    pub redirect_uris: Vec<String>,
}

impl Client {
    pub fn redirect_uri_registered(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }
}

/// A pending single-use authorization code, stored by hash
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRecord {
    pub code_hash: String,
    pub account_id: Uuid,
    pub client_id: String,
    pub redirect_uri: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCodeRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// A refresh token, stored by hash
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub account_id: Uuid,
    pub client_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }
}

// ============================================
// JWT Claims
// ============================================

/// Claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: account id for user-bound grants, client id otherwise
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Unique token identifier
    pub jti: Uuid,
}

/// Claims carried by identity tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityTokenClaims {
    pub sub: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

// ============================================
// Wire Types
// ============================================

/// Raw token endpoint request body, before grant-type dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequestBody {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A validated token request, one variant per supported grant
#[derive(Debug, Clone)]
pub enum TokenRequest {
    AuthorizationCode { code: String, redirect_uri: String },
    ClientCredentials { client_id: String, client_secret: String },
    RefreshToken { refresh_token: String },
}

impl TokenRequest {
    /// Dispatch on `grant_type`.
    ///
    /// Unknown grant types are rejected here, before any store is touched,
    /// so an unsupported request can never leave partial token state
    /// behind.
    pub fn from_wire(body: &TokenRequestBody) -> Result<Self, AuthError> {
        match body.grant_type.as_str() {
            "authorization_code" => Ok(TokenRequest::AuthorizationCode {
                code: body
                    .code
                    .clone()
                    .ok_or(AuthError::InvalidGrant("code is required"))?,
                redirect_uri: body
                    .redirect_uri
                    .clone()
                    .ok_or(AuthError::InvalidGrant("redirect_uri is required"))?,
            }),
            "client_credentials" => Ok(TokenRequest::ClientCredentials {
                client_id: body.client_id.clone().ok_or(AuthError::InvalidClient)?,
                client_secret: body.client_secret.clone().ok_or(AuthError::InvalidClient)?,
            }),
            "refresh_token" => Ok(TokenRequest::RefreshToken {
                refresh_token: body
                    .refresh_token
                    .clone()
                    .ok_or(AuthError::InvalidGrant("refresh_token is required"))?,
            }),
            _ => Err(AuthError::UnsupportedGrantType),
        }
    }
}

/// Token endpoint success body (RFC 6749 §5.1)
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

// ============================================
// Token Issuer
// ============================================

/// Mints and validates tokens for the supported grants
pub struct TokenIssuer {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<dyn TokenStore>,
    clients: Arc<dyn ClientStore>,
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenStore>,
        clients: Arc<dyn ClientStore>,
        config: AuthConfig,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Self {
            accounts,
            tokens,
            clients,
            config,
            encoding_key,
            decoding_key,
        }
    }

    // ============================================
    // Authorization Codes
    // ============================================

    /// Issue a single-use authorization code for an authenticated account.
    ///
    /// The caller (the authorization endpoint, external to this core) has
    /// already authenticated the user; this binds a short-lived code to the
    /// account, client, and redirect URI for later exchange.
    pub async fn issue_authorization_code(
        &self,
        account_id: Uuid,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let client = self
            .clients
            .find_client(client_id)
            .await?
            .ok_or(AuthError::InvalidClient)?;

        if !client.redirect_uri_registered(redirect_uri) {
            return Err(AuthError::InvalidGrant("redirect_uri is not registered"));
        }

        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let code = random_token();
        let now = Utc::now();
        self.tokens
            .put_code(AuthorizationCodeRecord {
                code_hash: self.hash_token(&code),
                account_id,
                client_id: client.client_id,
                redirect_uri: redirect_uri.to_string(),
                issued_at: now,
                expires_at: now + Duration::seconds(self.config.auth_code_lifetime),
            })
            .await?;

        Ok(code)
    }

    // ============================================
    // Grant Exchange
    // ============================================

    /// Exchange a validated token request for tokens.
    pub async fn exchange(&self, request: TokenRequest) -> Result<TokenResponse, AuthError> {
        match request {
            TokenRequest::AuthorizationCode { code, redirect_uri } => {
                self.exchange_authorization_code(&code, &redirect_uri).await
            }
            TokenRequest::ClientCredentials {
                client_id,
                client_secret,
            } => self.exchange_client_credentials(&client_id, &client_secret).await,
            TokenRequest::RefreshToken { refresh_token } => {
                self.exchange_refresh_token(&refresh_token).await
            }
        }
    }

    async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let record = match self.tokens.consume_code(&self.hash_token(code)).await? {
            Some(record) => record,
            None => {
                tracing::warn!("Authorization code unknown or already redeemed");
                return Err(AuthError::InvalidGrant(
                    "authorization code is invalid or already redeemed",
                ));
            }
        };

        if record.is_expired() {
            return Err(AuthError::InvalidGrant("authorization code has expired"));
        }

        if record.redirect_uri != redirect_uri {
            return Err(AuthError::InvalidGrant("redirect_uri does not match"));
        }

        let account = self
            .accounts
            .find_by_id(record.account_id)
            .await?
            .ok_or(AuthError::InvalidGrant("subject no longer exists"))?;

        let access_token = self.generate_access_token(&account.id().to_string())?;
        let refresh_token = self
            .issue_refresh_token(account.id(), &record.client_id)
            .await?;
        let id_token = self.generate_identity_token(&account.id().to_string(), account.email())?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_lifetime,
            refresh_token: Some(refresh_token),
            id_token: Some(id_token),
        })
    }

    async fn exchange_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse, AuthError> {
        let client = self
            .clients
            .find_client(client_id)
            .await?
            .ok_or(AuthError::InvalidClient)?;

        if client.client_secret != client_secret {
            tracing::warn!(client_id = %client_id, "Client authentication failed");
            return Err(AuthError::InvalidClient);
        }

        // Machine-to-machine: no end user, so no refresh or identity token.
        let access_token = self.generate_access_token(&client.client_id)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_lifetime,
            refresh_token: None,
            id_token: None,
        })
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let token_hash = self.hash_token(refresh_token);
        let record = self
            .tokens
            .get_refresh_token(&token_hash)
            .await?
            .ok_or(AuthError::InvalidGrant("refresh token is invalid"))?;

        if !record.is_valid() {
            if record.is_revoked() {
                // Rotation means a revoked token should never come back.
                // Treat reuse as theft and kill the whole family.
                tracing::warn!(
                    account_id = %record.account_id,
                    "Refresh token reuse detected, revoking all tokens for account"
                );
                self.tokens.revoke_all_for_account(record.account_id).await?;
                return Err(AuthError::InvalidGrant("refresh token has been revoked"));
            }
            return Err(AuthError::InvalidGrant("refresh token has expired"));
        }

        let account = self
            .accounts
            .find_by_id(record.account_id)
            .await?
            .ok_or(AuthError::InvalidGrant("subject no longer exists"))?;

        if account.is_locked_out(Utc::now()) {
            return Err(AuthError::InvalidGrant("account is locked"));
        }

        let access_token = self.generate_access_token(&account.id().to_string())?;
        let new_refresh_token = self
            .issue_refresh_token(account.id(), &record.client_id)
            .await?;

        // Rotate: the old token dies with the exchange.
        self.tokens.revoke_refresh_token(&token_hash).await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_lifetime,
            refresh_token: Some(new_refresh_token),
            id_token: None,
        })
    }

    // ============================================
    // Token Construction & Validation
    // ============================================

    fn generate_access_token(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.access_token_lifetime)).timestamp(),
            jti: Uuid::new_v4(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    fn generate_identity_token(&self, subject: &str, email: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = IdentityTokenClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.identity_token_lifetime)).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    async fn issue_refresh_token(
        &self,
        account_id: Uuid,
        client_id: &str,
    ) -> Result<String, AuthError> {
        let token = random_token();
        let now = Utc::now();

        self.tokens
            .put_refresh_token(RefreshTokenRecord {
                id: Uuid::new_v4(),
                token_hash: self.hash_token(&token),
                account_id,
                client_id: client_id.to_string(),
                issued_at: now,
                expires_at: now + Duration::seconds(self.config.refresh_token_lifetime),
                revoked_at: None,
            })
            .await?;

        Ok(token)
    }

    /// Validate an access token and return its claims.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Hash an opaque token for storage lookup.
    fn hash_token(&self, token: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        self.config.jwt_secret.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

/// Generate an opaque token: 32 random bytes, hex-encoded.
fn random_token() -> String {
    use std::fmt::Write;

    let bytes: [u8; 32] = rand::thread_rng().gen();
    let mut result = String::with_capacity(64);
    for byte in bytes {
        let _ = write!(result, "{:02x}", byte);
    }
    result
}
