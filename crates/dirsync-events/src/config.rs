//! Broker settings for the deletion topic.

use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::str::FromStr;

use crate::error::EventError;

const DEFAULT_CLIENT_ID: &str = "dirsync";
const DEFAULT_GROUP_ID: &str = "dirsync-deprovision";
const DEFAULT_BATCH_SIZE: usize = 32;

/// SASL mechanisms librdkafka accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" => Ok(Self::ScramSha512),
            _ => Err(invalid("KAFKA_SASL_MECHANISM", format!("unknown mechanism '{s}'"))),
        }
    }
}

/// How the consumer authenticates to the brokers. SASL variants carry their
/// credentials so a SASL protocol can never be configured without them.
#[derive(Clone)]
pub enum BrokerSecurity {
    Plaintext,
    Tls,
    Sasl {
        tls: bool,
        mechanism: SaslMechanism,
        username: String,
        password: SecretString,
    },
}

impl BrokerSecurity {
    /// Value for librdkafka's `security.protocol`.
    #[must_use]
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Tls => "SSL",
            Self::Sasl { tls: false, .. } => "SASL_PLAINTEXT",
            Self::Sasl { tls: true, .. } => "SASL_SSL",
        }
    }

    /// Read `KAFKA_SECURITY_PROTOCOL` and, for SASL, the `KAFKA_SASL_*`
    /// variables.
    fn from_env() -> Result<Self, EventError> {
        let protocol = env::var("KAFKA_SECURITY_PROTOCOL").unwrap_or_default();
        let tls = match protocol.to_ascii_uppercase().as_str() {
            "" | "PLAINTEXT" => return Ok(Self::Plaintext),
            "SSL" => return Ok(Self::Tls),
            "SASL_PLAINTEXT" => false,
            "SASL_SSL" => true,
            other => {
                return Err(invalid(
                    "KAFKA_SECURITY_PROTOCOL",
                    format!("unknown protocol '{other}'"),
                ))
            }
        };
        Ok(Self::Sasl {
            tls,
            mechanism: required("KAFKA_SASL_MECHANISM")?.parse()?,
            username: required("KAFKA_SASL_USERNAME")?,
            password: SecretString::from(required("KAFKA_SASL_PASSWORD")?),
        })
    }
}

impl std::fmt::Debug for BrokerSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sasl {
                mechanism,
                username,
                ..
            } => f
                .debug_struct("Sasl")
                .field("protocol", &self.protocol())
                .field("mechanism", mechanism)
                .field("username", username)
                .field("password", &"***REDACTED***")
                .finish(),
            other => f.write_str(other.protocol()),
        }
    }
}

/// Where deletion messages are read from.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated broker list.
    pub bootstrap_servers: String,
    pub security: BrokerSecurity,
    pub client_id: String,
    pub group_id: String,
    pub topic: String,
    /// Upper bound on messages handed to the consumer at once.
    pub batch_size: usize,
}

impl KafkaConfig {
    /// Load from the environment.
    ///
    /// `KAFKA_BOOTSTRAP_SERVERS` and `KAFKA_TOPIC` are required. Optional:
    /// `KAFKA_SECURITY_PROTOCOL`, `KAFKA_CLIENT_ID`, `KAFKA_GROUP_ID`,
    /// `KAFKA_BATCH_SIZE`, plus `KAFKA_SASL_MECHANISM`,
    /// `KAFKA_SASL_USERNAME` and `KAFKA_SASL_PASSWORD` for the SASL protocols.
    pub fn from_env() -> Result<Self, EventError> {
        let batch_size = match env::var("KAFKA_BATCH_SIZE") {
            Ok(v) => v
                .parse()
                .map_err(|_| invalid("KAFKA_BATCH_SIZE", format!("'{v}' is not a number")))?,
            Err(_) => DEFAULT_BATCH_SIZE,
        };

        Self {
            bootstrap_servers: required("KAFKA_BOOTSTRAP_SERVERS")?,
            security: BrokerSecurity::from_env()?,
            client_id: env::var("KAFKA_CLIENT_ID").unwrap_or_else(|_| DEFAULT_CLIENT_ID.into()),
            group_id: env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| DEFAULT_GROUP_ID.into()),
            topic: required("KAFKA_TOPIC")?,
            batch_size,
        }
        .validated()
    }

    /// Plaintext config with default client, group and batch size.
    pub fn new(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<Self, EventError> {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            security: BrokerSecurity::Plaintext,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            topic: topic.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
        .validated()
    }

    #[must_use]
    pub fn with_security(mut self, security: BrokerSecurity) -> Self {
        self.security = security;
        self
    }

    #[must_use]
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Properties handed to librdkafka. Offsets are committed by hand after
    /// each batch.
    #[must_use]
    pub fn client_properties(&self) -> Vec<(&'static str, String)> {
        let mut props = vec![
            ("bootstrap.servers", self.bootstrap_servers.clone()),
            ("client.id", self.client_id.clone()),
            ("group.id", self.group_id.clone()),
            ("security.protocol", self.security.protocol().to_string()),
            ("auto.offset.reset", "earliest".to_string()),
            ("enable.auto.commit", "false".to_string()),
            ("session.timeout.ms", "30000".to_string()),
        ];
        if let BrokerSecurity::Sasl {
            mechanism,
            username,
            password,
            ..
        } = &self.security
        {
            props.push(("sasl.mechanism", mechanism.as_str().to_string()));
            props.push(("sasl.username", username.clone()));
            props.push(("sasl.password", password.expose_secret().to_string()));
        }
        props
    }

    fn validated(self) -> Result<Self, EventError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(invalid("KAFKA_BOOTSTRAP_SERVERS", "must not be empty".into()));
        }
        if self.topic.trim().is_empty() {
            return Err(invalid("KAFKA_TOPIC", "must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(invalid("KAFKA_BATCH_SIZE", "must be at least 1".into()));
        }
        Ok(self)
    }
}

fn required(var: &str) -> Result<String, EventError> {
    env::var(var).map_err(|_| EventError::ConfigMissing {
        var: var.to_string(),
    })
}

fn invalid(var: &str, reason: String) -> EventError {
    EventError::ConfigInvalid {
        var: var.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop<'a>(props: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        props
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_defaults() {
        let config = KafkaConfig::new("localhost:9092", "feishu.user.deleted").unwrap();

        assert_eq!(config.client_id, "dirsync");
        assert_eq!(config.group_id, "dirsync-deprovision");
        assert_eq!(config.batch_size, 32);

        let props = config.client_properties();
        assert_eq!(prop(&props, "security.protocol"), Some("PLAINTEXT"));
        assert_eq!(prop(&props, "enable.auto.commit"), Some("false"));
        assert_eq!(prop(&props, "sasl.mechanism"), None);
    }

    #[test]
    fn test_empty_topic_rejected() {
        let err = KafkaConfig::new("localhost:9092", " ").unwrap_err();
        assert!(matches!(err, EventError::ConfigInvalid { var, .. } if var == "KAFKA_TOPIC"));
    }

    #[test]
    fn test_sasl_properties() {
        let config = KafkaConfig::new("b:9093", "t")
            .unwrap()
            .with_security(BrokerSecurity::Sasl {
                tls: true,
                mechanism: "scram_sha_512".parse().unwrap(),
                username: "svc".to_string(),
                password: SecretString::from("pw-123".to_string()),
            })
            .with_group_id("dirsync-staging");

        let props = config.client_properties();
        assert_eq!(prop(&props, "security.protocol"), Some("SASL_SSL"));
        assert_eq!(prop(&props, "sasl.mechanism"), Some("SCRAM-SHA-512"));
        assert_eq!(prop(&props, "sasl.password"), Some("pw-123"));
        assert_eq!(prop(&props, "group.id"), Some("dirsync-staging"));
        assert!(!format!("{config:?}").contains("pw-123"));
    }

    #[test]
    fn test_unknown_mechanism() {
        assert!("GSSAPI".parse::<SaslMechanism>().is_err());
    }
}
