//! Sync configuration.
//!
//! One `SyncConfig` value describes a single external source and where its
//! groups and users land in the directory. It is built once at startup and
//! shared (behind an `Arc`) by every component that needs it.

use secrecy::{ExposeSecret, SecretString};
use std::env;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Configuration for one external source.
pub struct SyncConfig {
    /// Source tag, e.g. `feishu`. Prefixes every external id.
    pub source: String,
    /// Directory suffix, e.g. `dc=example,dc=com`.
    pub base_dn: String,
    /// Parent DN of top-level groups.
    pub group_base_dn: String,
    /// Parent DN of every user entry.
    pub user_base_dn: String,
    /// Placeholder member for new `groupOfUniqueNames` entries.
    pub admin_dn: String,
    /// Initial credential given to synced users.
    pub user_init_password: SecretString,
    /// Role assigned to externally-sourced accounts.
    pub default_role_id: i64,
    /// Value written to the `creator` column.
    pub creator: String,
    /// Used to synthesize a mail address when the source has none.
    pub mail_domain: Option<String>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("source", &self.source)
            .field("base_dn", &self.base_dn)
            .field("group_base_dn", &self.group_base_dn)
            .field("user_base_dn", &self.user_base_dn)
            .field("admin_dn", &self.admin_dn)
            .field("user_init_password", &"***REDACTED***")
            .field("default_role_id", &self.default_role_id)
            .field("creator", &self.creator)
            .field("mail_domain", &self.mail_domain)
            .finish()
    }
}

impl SyncConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `LDAP_BASE_DN`
    /// - `LDAP_ADMIN_DN`
    /// - `LDAP_USER_INIT_PASSWORD`
    ///
    /// Optional:
    /// - `SYNC_SOURCE` (default: `feishu`)
    /// - `LDAP_GROUP_BASE_DN` (default: `LDAP_BASE_DN`)
    /// - `LDAP_USER_BASE_DN` (default: `ou=people,<LDAP_BASE_DN>`)
    /// - `SYNC_DEFAULT_ROLE_ID` (default: 2)
    /// - `SYNC_CREATOR` (default: `system`)
    /// - `SYNC_MAIL_DOMAIN`
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |var: &str| env::var(var).map_err(|_| ConfigError::MissingVar(var.into()));

        let mut builder = Self::builder()
            .base_dn(required("LDAP_BASE_DN")?)
            .admin_dn(required("LDAP_ADMIN_DN")?)
            .user_init_password(required("LDAP_USER_INIT_PASSWORD")?);

        if let Ok(source) = env::var("SYNC_SOURCE") {
            builder = builder.source(source);
        }
        if let Ok(dn) = env::var("LDAP_GROUP_BASE_DN") {
            builder = builder.group_base_dn(dn);
        }
        if let Ok(dn) = env::var("LDAP_USER_BASE_DN") {
            builder = builder.user_base_dn(dn);
        }
        if let Ok(raw) = env::var("SYNC_DEFAULT_ROLE_ID") {
            let id = raw.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                var: "SYNC_DEFAULT_ROLE_ID".into(),
                message: e.to_string(),
            })?;
            builder = builder.default_role_id(id);
        }
        if let Ok(creator) = env::var("SYNC_CREATOR") {
            builder = builder.creator(creator);
        }
        if let Ok(domain) = env::var("SYNC_MAIL_DOMAIN") {
            builder = builder.mail_domain(domain);
        }

        builder.build()
    }

    /// The initial credential as plain text, for the directory write.
    #[must_use]
    pub fn init_password(&self) -> &str {
        self.user_init_password.expose_secret()
    }
}

/// Builder for `SyncConfig`.
#[derive(Default)]
pub struct SyncConfigBuilder {
    source: Option<String>,
    base_dn: Option<String>,
    group_base_dn: Option<String>,
    user_base_dn: Option<String>,
    admin_dn: Option<String>,
    user_init_password: Option<String>,
    default_role_id: Option<i64>,
    creator: Option<String>,
    mail_domain: Option<String>,
}

impl SyncConfigBuilder {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn base_dn(mut self, dn: impl Into<String>) -> Self {
        self.base_dn = Some(dn.into());
        self
    }

    pub fn group_base_dn(mut self, dn: impl Into<String>) -> Self {
        self.group_base_dn = Some(dn.into());
        self
    }

    pub fn user_base_dn(mut self, dn: impl Into<String>) -> Self {
        self.user_base_dn = Some(dn.into());
        self
    }

    pub fn admin_dn(mut self, dn: impl Into<String>) -> Self {
        self.admin_dn = Some(dn.into());
        self
    }

    pub fn user_init_password(mut self, password: impl Into<String>) -> Self {
        self.user_init_password = Some(password.into());
        self
    }

    #[must_use]
    pub fn default_role_id(mut self, id: i64) -> Self {
        self.default_role_id = Some(id);
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn mail_domain(mut self, domain: impl Into<String>) -> Self {
        self.mail_domain = Some(domain.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let base_dn = self
            .base_dn
            .ok_or_else(|| ConfigError::MissingVar("base_dn".into()))?;
        let admin_dn = self
            .admin_dn
            .ok_or_else(|| ConfigError::MissingVar("admin_dn".into()))?;
        let password = self
            .user_init_password
            .ok_or_else(|| ConfigError::MissingVar("user_init_password".into()))?;

        let source = self.source.unwrap_or_else(|| "feishu".to_string());
        if source.is_empty() || source.contains(',') || source.contains('=') {
            return Err(ConfigError::InvalidValue {
                var: "source".into(),
                message: format!("'{source}' is not a usable source tag"),
            });
        }

        Ok(SyncConfig {
            group_base_dn: self.group_base_dn.unwrap_or_else(|| base_dn.clone()),
            user_base_dn: self
                .user_base_dn
                .unwrap_or_else(|| format!("ou=people,{base_dn}")),
            source,
            base_dn,
            admin_dn,
            user_init_password: SecretString::from(password),
            default_role_id: self.default_role_id.unwrap_or(2),
            creator: self.creator.unwrap_or_else(|| "system".to_string()),
            mail_domain: self.mail_domain.filter(|d| !d.is_empty()),
        })
    }
}
