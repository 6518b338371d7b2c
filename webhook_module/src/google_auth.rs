//! Google OAuth 2.0 access tokens for the Sheets API.
//!
//! Supports a service account (signed JWT bearer grant) and a pre-issued
//! access token for sandbox environments.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Scope required for appending to and reading from spreadsheets.
pub const GOOGLE_SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Error types for Google authentication.
#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("invalid service account credentials: {0}")]
    InvalidServiceAccount(String),
    #[error("jwt signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The fields of a service-account key file that token exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, GoogleAuthError> {
        let key: Self = serde_json::from_str(json)
            .map_err(|err| GoogleAuthError::InvalidServiceAccount(err.to_string()))?;
        if key.client_email.trim().is_empty() {
            return Err(GoogleAuthError::InvalidServiceAccount(
                "client_email is empty".to_string(),
            ));
        }
        // Fail at startup rather than on the first append.
        EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|err| GoogleAuthError::InvalidServiceAccount(err.to_string()))?;
        Ok(key)
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(DEFAULT_TOKEN_URI)
    }
}

/// Credentials resolved from configuration.
#[derive(Debug, Clone)]
pub enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    /// Pre-generated token, assumed valid for one hour.
    AccessToken(String),
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Google access-token provider with a process-wide cache.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    client: reqwest::Client,
    credentials: GoogleCredentials,
    scope: String,
    cached: Arc<RwLock<Option<CachedToken>>>,
}

impl GoogleAuth {
    pub fn new(client: reqwest::Client, credentials: GoogleCredentials) -> Self {
        Self {
            client,
            credentials,
            scope: GOOGLE_SHEETS_SCOPE.to_string(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a valid access token, exchanging a fresh assertion if necessary.
    pub async fn get_access_token(&self) -> Result<String, GoogleAuthError> {
        let key = match &self.credentials {
            GoogleCredentials::AccessToken(token) => return Ok(token.clone()),
            GoogleCredentials::ServiceAccount(key) => key,
        };

        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.exchange_assertion(key).await?;
        let access_token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(access_token)
    }

    /// Drops the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn exchange_assertion(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<CachedToken, GoogleAuthError> {
        debug!("exchanging service account assertion for {}", key.client_email);
        let assertion = self.sign_assertion(key)?;

        let response = self
            .client
            .post(key.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("google token exchange failed: {} - {}", status, body);
            return Err(GoogleAuthError::TokenExchangeFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token: OAuthTokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.max(0) as u64);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    fn sign_assertion(&self, key: &ServiceAccountKey) -> Result<String, GoogleAuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: &self.scope,
            aud: key.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &encoding_key)?)
    }
}
