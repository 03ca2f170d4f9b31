//! Service configuration loaded from environment variables.
//!
//! Loading is fail-fast: the process refuses to start on a missing or
//! malformed value instead of running with a half-configured engine.

use secrecy::SecretString;
use std::env;
use std::time::Duration;
use thiserror::Error;

use dirsync_connector_feishu::{FeishuConfig, FeishuConfigError};
use dirsync_connector_ldap::{LdapConfig, LdapConfigError};
use dirsync_core::SyncConfig;
#[cfg(feature = "kafka")]
use dirsync_events::{EventError, KafkaConfig};

use crate::logging::DEFAULT_LOG_FILTER;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    #[error("sync configuration: {0}")]
    Sync(#[from] dirsync_core::ConfigError),

    #[error("LDAP configuration: {0}")]
    Ldap(#[from] LdapConfigError),

    #[error("Feishu configuration: {0}")]
    Feishu(#[from] FeishuConfigError),

    #[cfg(feature = "kafka")]
    #[error("Kafka configuration: {0}")]
    Kafka(#[from] EventError),
}

/// Everything the service needs to start.
#[derive(Debug)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server listen port
    pub port: u16,
    /// Tracing filter directive
    pub log_filter: String,

    pub database_url: String,
    pub db_max_connections: u32,

    /// Period of the scheduled full sync; `None` disables it.
    pub sync_interval: Option<Duration>,
    /// Period of the scheduled consistency audit; `None` disables it.
    pub audit_interval: Option<Duration>,

    /// Token the webhook payloads must carry, when set.
    pub webhook_verification_token: Option<SecretString>,

    pub sync: SyncConfig,
    pub ldap: LdapConfig,
    pub feishu: FeishuConfig,

    /// Present when `KAFKA_BOOTSTRAP_SERVERS` is set.
    #[cfg(feature = "kafka")]
    pub kafka: Option<KafkaConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Service variables (all optional):
    /// - `HOST` (default `0.0.0.0`), `PORT` (default `8080`)
    /// - `DIRSYNC_LOG` (default `info,dirsync=debug`; `RUST_LOG` overrides it)
    /// - `DATABASE_URL` (required), `DATABASE_MAX_CONNECTIONS` (default 10)
    /// - `SYNC_INTERVAL_SECS`, `AUDIT_INTERVAL_SECS` (0 or unset disables)
    /// - `FEISHU_VERIFICATION_TOKEN`
    ///
    /// The sync, LDAP, Feishu and Kafka sections read their own variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;
        let log_filter = env::var("DIRSYNC_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let database_url = required("DATABASE_URL")?;
        let db_max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => parse_number("DATABASE_MAX_CONNECTIONS", &raw)?,
            Err(_) => 10,
        };

        let sync_interval = interval("SYNC_INTERVAL_SECS")?;
        let audit_interval = interval("AUDIT_INTERVAL_SECS")?;

        let webhook_verification_token = env::var("FEISHU_VERIFICATION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        #[cfg(feature = "kafka")]
        let kafka = match env::var("KAFKA_BOOTSTRAP_SERVERS") {
            Ok(_) => Some(KafkaConfig::from_env()?),
            Err(_) => None,
        };

        Ok(Self {
            host,
            port,
            log_filter,
            database_url,
            db_max_connections,
            sync_interval,
            audit_interval,
            webhook_verification_token,
            sync: SyncConfig::from_env()?,
            ldap: LdapConfig::from_env()?,
            feishu: FeishuConfig::from_env()?,
            #[cfg(feature = "kafka")]
            kafka,
        })
    }

    /// `host:port`
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var.to_string()))
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        message: e.to_string(),
    })
}

fn interval(var: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(raw) => Ok(parse_interval(var, &raw)?),
        Err(_) => Ok(None),
    }
}

fn parse_interval(var: &str, raw: &str) -> Result<Option<Duration>, ConfigError> {
    let secs: u64 = parse_number(var, raw)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(
            parse_interval("SYNC_INTERVAL_SECS", "3600").unwrap(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(parse_interval("SYNC_INTERVAL_SECS", "0").unwrap(), None);
        assert!(matches!(
            parse_interval("SYNC_INTERVAL_SECS", "hourly"),
            Err(ConfigError::InvalidValue { var, .. }) if var == "SYNC_INTERVAL_SECS"
        ));
    }

    #[test]
    fn test_parse_number() {
        let n: u32 = parse_number("DATABASE_MAX_CONNECTIONS", " 25 ").unwrap();
        assert_eq!(n, 25);
        assert!(parse_number::<u32>("DATABASE_MAX_CONNECTIONS", "-1").is_err());
    }
}
