//! OAuth2 access tokens for the storage client.
//!
//! Credentials are delegated entirely to the environment. Sources, first
//! match wins:
//!
//! 1. `GOOGLE_OAUTH_ACCESS_TOKEN`: a ready-made bearer token.
//! 2. A credentials file (`storage.credentials_path`, usually from
//!    `GOOGLE_APPLICATION_CREDENTIALS`):
//!    - `service_account`: an RS256-signed JWT assertion is exchanged at the
//!      key's `token_uri`.
//!    - `authorized_user`: the refresh token is exchanged at the token URI.
//! 3. Nothing configured: requests go out unauthenticated (public buckets,
//!    local emulators).
//!
//! A credentials file that cannot be read or parsed does not stop the
//! process. The provider remembers the problem and every token request
//! fails with [`StorageError::Credentials`], which the resolver treats like
//! any other storage failure.
//!
//! Exchanged tokens are cached until [`EXPIRY_MARGIN_SECS`] before they
//! expire.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::storage::StorageError;

pub const STATIC_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const READ_ONLY_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";
pub const EXPIRY_MARGIN_SECS: i64 = 60;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// The `type`-tagged credentials file written by `gcloud`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    Static(String),
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    Anonymous,
    /// Credentials were configured but could not be loaded.
    Unavailable(String),
}

impl TokenSource {
    /// Resolve from the process environment and an optional credentials path.
    pub fn from_env(credentials_path: Option<&Path>) -> Self {
        let static_token = std::env::var(STATIC_TOKEN_ENV).ok();
        Self::resolve(static_token, credentials_path)
    }

    pub fn resolve(static_token: Option<String>, credentials_path: Option<&Path>) -> Self {
        if let Some(token) = static_token.filter(|t| !t.trim().is_empty()) {
            return TokenSource::Static(token.trim().to_string());
        }
        match credentials_path {
            Some(path) => match load_credentials_file(path) {
                Ok(source) => source,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "failed to load storage credentials");
                    TokenSource::Unavailable(e.to_string())
                }
            },
            None => TokenSource::Anonymous,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TokenSource::Static(_) => "static",
            TokenSource::ServiceAccount(_) => "service_account",
            TokenSource::AuthorizedUser(_) => "authorized_user",
            TokenSource::Anonymous => "anonymous",
            TokenSource::Unavailable(_) => "unavailable",
        }
    }
}

/// Parse a credentials file into a [`TokenSource`].
pub fn load_credentials_file(path: &Path) -> Result<TokenSource, StorageError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StorageError::Credentials(format!("cannot read {}: {}", path.display(), e))
    })?;
    let file: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
        StorageError::Credentials(format!("cannot parse {}: {}", path.display(), e))
    })?;
    Ok(match file {
        CredentialsFile::ServiceAccount(key) => TokenSource::ServiceAccount(key),
        CredentialsFile::AuthorizedUser(user) => TokenSource::AuthorizedUser(user),
    })
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Hands out bearer tokens for storage requests.
pub struct TokenProvider {
    source: TokenSource,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(source: TokenSource, http: reqwest::Client) -> Self {
        Self {
            source,
            http,
            cached: Mutex::new(None),
        }
    }

    /// A bearer token, or `None` for anonymous access.
    pub async fn token(&self) -> Result<Option<String>, StorageError> {
        match &self.source {
            TokenSource::Anonymous => return Ok(None),
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::Unavailable(reason) => {
                return Err(StorageError::Credentials(reason.clone()))
            }
            TokenSource::ServiceAccount(_) | TokenSource::AuthorizedUser(_) => {}
        }

        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(Some(token.value.clone()));
        }

        let fresh = self.exchange(now).await?;
        tracing::debug!(source = self.source.kind(), expires_at = %fresh.expires_at, "obtained storage access token");
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(Some(value))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, StorageError> {
        let (token_uri, form): (&str, Vec<(&str, String)>) = match &self.source {
            TokenSource::ServiceAccount(key) => {
                let assertion = sign_assertion(key, now)?;
                (
                    key.token_uri.as_str(),
                    vec![("grant_type", JWT_BEARER_GRANT.to_string()), ("assertion", assertion)],
                )
            }
            TokenSource::AuthorizedUser(user) => (
                user.token_uri.as_str(),
                vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("client_id", user.client_id.clone()),
                    ("client_secret", user.client_secret.clone()),
                    ("refresh_token", user.refresh_token.clone()),
                ],
            ),
            other => {
                return Err(StorageError::Credentials(format!(
                    "token source '{}' does not exchange tokens",
                    other.kind()
                )))
            }
        };

        let resp = self
            .http
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| StorageError::Credentials(format!("token request to {} failed: {}", token_uri, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Credentials(format!(
                "token endpoint returned HTTP {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::Credentials(format!("invalid token response: {}", e)))?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at: expiry_after(now, token.expires_in)?,
        })
    }
}

/// `now + expires_in`, rejecting lifetimes chrono cannot represent.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, StorageError> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            StorageError::Credentials(format!("token lifetime out of range: {}s", expires_in))
        })
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, StorageError> {
    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: READ_ONLY_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| StorageError::Credentials(format!("invalid service account private key: {}", e)))?;
    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map_err(|e| StorageError::Credentials(format!("failed to sign token assertion: {}", e)))
}
