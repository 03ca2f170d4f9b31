//! Tenant access token handling.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use dirsync_core::RemoteError;

use crate::api::TenantTokenResponse;

const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

/// Tokens are replaced this long before the server says they expire.
const REFRESH_MARGIN_MINUTES: i64 = 5;

struct TenantToken {
    value: SecretString,
    refresh_after: DateTime<Utc>,
}

impl TenantToken {
    fn from_response(response: TenantTokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            value: SecretString::from(response.tenant_access_token),
            refresh_after: now + Duration::seconds(response.expire)
                - Duration::minutes(REFRESH_MARGIN_MINUTES),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.refresh_after
    }
}

/// Caches the tenant access token for the app credentials.
pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    app_id: String,
    app_secret: SecretString,
    current: RwLock<Option<TenantToken>>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: SecretString,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}{TOKEN_PATH}", base_url.into()),
            app_id: app_id.into(),
            app_secret,
            current: RwLock::new(None),
        }
    }

    /// A token valid for at least the refresh margin. Concurrent callers
    /// that find it stale share a single refresh.
    #[instrument(skip(self), fields(app_id = %self.app_id))]
    pub async fn get_token(&self) -> Result<String, RemoteError> {
        if let Some(token) = self.current.read().await.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.expose_secret().to_string());
            }
        }

        let mut slot = self.current.write().await;
        if let Some(token) = slot.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.expose_secret().to_string());
            }
        }

        debug!("Requesting tenant access token");
        let token = TenantToken::from_response(self.request_token().await?, Utc::now());
        let value = token.value.expose_secret().to_string();
        *slot = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<TenantTokenResponse, RemoteError> {
        let response = self
            .http
            .post(&self.token_url)
            .json(&serde_json::json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| RemoteError::Auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TenantTokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Auth(format!("malformed token response: {e}")))?;

        if token.code != 0 || token.tenant_access_token.is_empty() {
            return Err(RemoteError::Auth(format!(
                "token request rejected ({}): {}",
                token.code, token.msg
            )));
        }
        Ok(token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.current.write().await.take();
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(expire: i64) -> TenantTokenResponse {
        TenantTokenResponse {
            code: 0,
            msg: String::new(),
            tenant_access_token: "t-1".to_string(),
            expire,
        }
    }

    #[test]
    fn test_refreshed_before_expiry() {
        let now = Utc::now();
        let token = TenantToken::from_response(response(7200), now);

        assert!(token.is_fresh(now + Duration::minutes(100)));
        assert!(!token.is_fresh(now + Duration::minutes(116)));
    }

    #[test]
    fn test_short_lived_token_is_stale_immediately() {
        let now = Utc::now();
        let token = TenantToken::from_response(response(60), now);

        assert!(!token.is_fresh(now));
    }
}
