use chrono::Utc;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{AdsError, Result};
use super::models::{AccessToken, TokenGrant, TokenResponse};

/// Seconds before expiry at which a cached token is treated as stale
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 300;

/// OAuth client credentials for the refresh-token grant
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Caches the access token and refreshes it ahead of expiry.
///
/// The cache lock is held across the refresh call, so callers arriving during
/// an expired window wait for the in-flight refresh and reuse its token.
pub struct TokenManager {
    http: Client,
    auth_url: String,
    credentials: Option<Credentials>,
    margin: chrono::Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(http: Client, auth_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            http,
            auth_url: auth_url.into(),
            credentials,
            margin: chrono::Duration::seconds(TOKEN_SAFETY_MARGIN_SECS),
            cached: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| AdsError::Auth("ads API credentials are not configured".to_string()))
    }

    /// Return the cached token, refreshing it first when it is missing or stale
    pub async fn get_token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_usable(Utc::now(), self.margin) {
                return Ok(token.clone());
            }
            debug!(expires_at = %token.expires_at, "Access token stale, refreshing");
        }

        let token = self.refresh().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Forget the cached token so the next call refreshes
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn refresh(&self) -> Result<AccessToken> {
        let credentials = self.credentials()?;
        let grant = TokenGrant {
            grant_type: "refresh_token",
            refresh_token: &credentials.refresh_token,
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
        };

        let response = self
            .http
            .post(&self.auth_url)
            .form(&grant)
            .send()
            .await
            .map_err(|e| AdsError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Token refresh rejected");
            return Err(AdsError::Auth(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AdsError::Auth(format!("malformed token response: {}", e)))?;

        let value = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdsError::Auth("token response has no access_token".to_string()))?;

        let expires_at = Utc::now() + chrono::Duration::seconds(body.expires_in.max(0));
        info!(%expires_at, "Access token refreshed");

        Ok(AccessToken { value, expires_at })
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, token: AccessToken) {
        *self.cached.lock().await = Some(token);
    }
}
