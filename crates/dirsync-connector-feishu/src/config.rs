//! Feishu API configuration.

use secrecy::SecretString;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 50;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeishuConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Credentials and endpoints for the Feishu contact API.
pub struct FeishuConfig {
    /// API origin, without trailing slash.
    pub base_url: String,
    pub app_id: String,
    pub app_secret: SecretString,
    /// Items per listing page (1..=50).
    pub page_size: u32,
    pub timeout: Duration,
}

impl std::fmt::Debug for FeishuConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &"***REDACTED***")
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FeishuConfig {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: app_id.into(),
            app_secret: SecretString::from(app_secret.into()),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Point the client at another origin (e.g. a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `FEISHU_APP_ID`, `FEISHU_APP_SECRET`.
    /// Optional: `FEISHU_BASE_URL`, `FEISHU_PAGE_SIZE`.
    pub fn from_env() -> Result<Self, FeishuConfigError> {
        let app_id = required_var("FEISHU_APP_ID")?;
        let app_secret = required_var("FEISHU_APP_SECRET")?;

        let mut config = Self::new(app_id, app_secret);
        if let Ok(url) = std::env::var("FEISHU_BASE_URL") {
            config = config.with_base_url(url);
        }
        if let Ok(size) = std::env::var("FEISHU_PAGE_SIZE") {
            config.page_size = size.parse().map_err(|_| FeishuConfigError::InvalidValue {
                var: "FEISHU_PAGE_SIZE".to_string(),
                message: format!("'{size}' is not a number"),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeishuConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(FeishuConfigError::InvalidValue {
                var: "FEISHU_PAGE_SIZE".to_string(),
                message: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(FeishuConfigError::InvalidValue {
                var: "FEISHU_BASE_URL".to_string(),
                message: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if self.app_id.trim().is_empty() {
            return Err(FeishuConfigError::MissingVar("FEISHU_APP_ID".to_string()));
        }
        Ok(())
    }
}

fn required_var(name: &str) -> Result<String, FeishuConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FeishuConfigError::MissingVar(name.to_string()))
}
