//! Errors from configuring or reading an event source.
//!
//! A message that cannot be handled is never an `EventError`; the consumer
//! logs it and moves on to the next one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("missing setting {var}")]
    ConfigMissing { var: String },

    #[error("bad value for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    /// The consumer could not be created against `broker`.
    #[error("cannot reach {broker}: {cause}")]
    ConnectionFailed { broker: String, cause: String },

    /// Receiving from or committing on `topic` failed.
    #[error("topic {topic}: {cause}")]
    ConsumeFailed { topic: String, cause: String },

    #[cfg(feature = "kafka")]
    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl EventError {
    /// Broker-side failures that a later attempt may get past.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::ConsumeFailed { .. } => true,
            #[cfg(feature = "kafka")]
            Self::Kafka(_) => true,
            Self::ConfigMissing { .. } | Self::ConfigInvalid { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_errors_are_permanent() {
        assert!(!EventError::ConfigMissing { var: "KAFKA_TOPIC".into() }.is_transient());
        assert!(EventError::ConsumeFailed {
            topic: "feishu.user.deleted".into(),
            cause: "broker down".into(),
        }
        .is_transient());
    }
}
