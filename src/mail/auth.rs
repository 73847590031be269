//! Access tokens for the mail provider.
//!
//! The interactive OAuth consent flow lives outside this crate. What arrives
//! here is either a ready bearer token or a refresh token that can be
//! exchanged for one.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ConfigError, MailError};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the provider-reported expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Supplies a valid bearer token for each API call.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, MailError>;
}

/// A fixed, already-authorized token.
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<SecretString, MailError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// OAuth2 refresh-token exchange with an in-memory cache.
pub struct RefreshTokenSource {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl RefreshTokenSource {
    pub fn new(client_id: String, client_secret: SecretString, refresh_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id,
            client_secret,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    async fn fetch(&self) -> Result<CachedToken, MailError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", self.refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| MailError::Connection(format!("token request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Authentication(format!(
                "token refresh failed ({status}): {body}"
            )));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(format!("token response: {e}")))?;

        let lifetime = (payload.expires_in - EXPIRY_SKEW_SECS).max(0);
        Ok(CachedToken {
            token: SecretString::from(payload.access_token),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
    }
}

#[async_trait]
impl AccessTokenSource for RefreshTokenSource {
    async fn access_token(&self) -> Result<SecretString, MailError> {
        let mut cached = self.cached.lock().await;
        if let Some(ref token) = *cached
            && token.expires_at > Utc::now()
        {
            return Ok(token.token.clone());
        }

        debug!("Refreshing mail access token");
        let fresh = self.fetch().await?;
        info!(expires_at = %fresh.expires_at, "Mail access token refreshed");
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct StoredTokens {
    refresh_token: Option<String>,
}

/// Read the `refresh_token` field of a persisted OAuth token file.
/// A missing file is `Ok(None)`.
pub fn read_refresh_token(path: &Path) -> Result<Option<SecretString>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Io(e)),
    };
    let tokens: StoredTokens =
        serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message: format!("not a token file: {e}"),
        })?;
    Ok(tokens
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from))
}
