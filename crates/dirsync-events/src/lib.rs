//! # dirsync-events
//!
//! Intake of identity deletion events.
//!
//! Two paths lead to the same [`IdentityEventHandler`]:
//!
//! - **Webhook**: [`WebhookDispatcher`] decodes one callback body, answers
//!   the URL verification handshake and forwards `contact.user.deleted_v3`
//! - **Message bus**: [`BusConsumer`] processes batches from a
//!   [`MessageSubscription`] and acknowledges every batch
//!
//! Neither path returns per-message errors to its caller; failures are
//! logged and the message is dropped.
//!
//! ## Cargo Features
//!
//! - `kafka`: [`KafkaSubscription`] over rdkafka (requires librdkafka)

pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod memory;
pub mod webhook;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use bus::{BatchOutcome, BusConsumer, BusMessage, ConsumeResult, MessageSubscription};
pub use config::{BrokerSecurity, KafkaConfig, SaslMechanism};
pub use error::EventError;
pub use handler::{DeletionOutcome, IdentityEventHandler};
pub use memory::{MemoryBus, MemoryPublisher, MemorySubscription};
pub use webhook::{WebhookDispatcher, WebhookOutcome, USER_DELETED_EVENT};

#[cfg(feature = "kafka")]
pub use kafka::KafkaSubscription;
