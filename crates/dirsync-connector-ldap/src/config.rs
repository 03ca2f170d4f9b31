//! LDAP connection configuration.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;

/// Invalid or missing LDAP configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LdapConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Configuration for the LDAP directory store.
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    pub use_starttls: bool,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    /// Bind password.
    pub bind_password: SecretString,

    /// TCP connect timeout.
    pub connection_timeout_secs: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"***REDACTED***")
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

const DEFAULT_LDAP_PORT: u16 = 389;
const DEFAULT_LDAPS_PORT: u16 = 636;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(host: impl Into<String>, bind_dn: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_LDAP_PORT,
            use_ssl: false,
            use_starttls: false,
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(String::new()),
            connection_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `LDAP_HOST`, `LDAP_ADMIN_DN`, `LDAP_ADMIN_PASSWORD`.
    /// Optional: `LDAP_PORT`, `LDAP_USE_SSL`, `LDAP_STARTTLS`,
    /// `LDAP_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, LdapConfigError> {
        let host = required_var("LDAP_HOST")?;
        let bind_dn = required_var("LDAP_ADMIN_DN")?;
        let password = required_var("LDAP_ADMIN_PASSWORD")?;

        let mut config = Self::new(host, bind_dn).with_password(password);
        if parse_bool("LDAP_USE_SSL")? {
            config = config.with_ssl();
        }
        if parse_bool("LDAP_STARTTLS")? {
            config = config.with_starttls();
        }
        if let Ok(port) = std::env::var("LDAP_PORT") {
            config = config.with_port(port.parse().map_err(|_| LdapConfigError::InvalidValue {
                var: "LDAP_PORT".to_string(),
                message: format!("'{port}' is not a valid port"),
            })?);
        }
        if let Ok(secs) = std::env::var("LDAP_CONNECT_TIMEOUT_SECS") {
            config.connection_timeout_secs =
                secs.parse().map_err(|_| LdapConfigError::InvalidValue {
                    var: "LDAP_CONNECT_TIMEOUT_SECS".to_string(),
                    message: format!("'{secs}' is not a number of seconds"),
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = SecretString::from(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = DEFAULT_LDAPS_PORT;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Server URL derived from host, port and TLS mode.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub(crate) fn password(&self) -> &str {
        self.bind_password.expose_secret()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), LdapConfigError> {
        if self.host.trim().is_empty() {
            return Err(LdapConfigError::InvalidValue {
                var: "LDAP_HOST".to_string(),
                message: "host is required".to_string(),
            });
        }
        if self.bind_dn.trim().is_empty() {
            return Err(LdapConfigError::InvalidValue {
                var: "LDAP_ADMIN_DN".to_string(),
                message: "bind DN is required".to_string(),
            });
        }
        if self.port == 0 {
            return Err(LdapConfigError::InvalidValue {
                var: "LDAP_PORT".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.use_ssl && self.use_starttls {
            return Err(LdapConfigError::InvalidValue {
                var: "LDAP_STARTTLS".to_string(),
                message: "STARTTLS cannot be combined with LDAPS".to_string(),
            });
        }
        Ok(())
    }
}

fn required_var(name: &str) -> Result<String, LdapConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| LdapConfigError::MissingVar(name.to_string()))
}

fn parse_bool(name: &str) -> Result<bool, LdapConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(false),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(LdapConfigError::InvalidValue {
                var: name.to_string(),
                message: format!("'{v}' is not a boolean"),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_follows_tls_mode() {
        let config = LdapConfig::new("ldap.example.com", "cn=admin,dc=example,dc=com");
        assert_eq!(config.url(), "ldap://ldap.example.com:389");

        let config = config.with_ssl();
        assert_eq!(config.url(), "ldaps://ldap.example.com:636");

        let config = config.with_port(3269);
        assert_eq!(config.url(), "ldaps://ldap.example.com:3269");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = LdapConfig::new("h", "cn=admin").with_password("hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_validate() {
        assert!(LdapConfig::new("h", "cn=admin").validate().is_ok());
        assert!(LdapConfig::new("", "cn=admin").validate().is_err());
        assert!(LdapConfig::new("h", " ").validate().is_err());
        assert!(LdapConfig::new("h", "cn=admin")
            .with_ssl()
            .with_starttls()
            .validate()
            .is_err());
    }
}
