//! Message bus intake.
//!
//! Messages arrive in batches. Each one is decoded on its own; an
//! undecodable message or a failing deletion is logged and skipped, and the
//! batch is always acknowledged so a poison message cannot wedge the
//! subscription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::error::EventError;
use crate::handler::{DeletionOutcome, IdentityEventHandler};

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// One message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Broker-assigned id, used only for logging.
    pub id: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }
}

/// Body of a deletion message. Producers disagree on casing, so both
/// spellings are accepted.
#[derive(Debug, Deserialize)]
struct DeletionMessage {
    #[serde(alias = "unionId")]
    union_id: String,
}

/// Verdict handed back to the bus for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConsumeResult {
    /// The batch is done and must not be redelivered.
    Success,
}

/// Counters for one processed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub received: usize,
    pub deleted: usize,
    pub not_found: usize,
    /// Messages that could not be decoded.
    pub skipped: usize,
    /// Messages whose deletion failed.
    pub failed: usize,
    pub result: ConsumeResult,
}

/// A source of message batches with explicit acknowledgement.
#[async_trait]
pub trait MessageSubscription: Send {
    /// Next batch, or `None` once the subscription has ended.
    async fn next_batch(&mut self) -> Result<Option<Vec<BusMessage>>, EventError>;

    /// Acknowledge the batch returned by the last `next_batch` call.
    async fn ack(&mut self, result: ConsumeResult) -> Result<(), EventError>;
}

/// Feeds bus messages to an [`IdentityEventHandler`].
pub struct BusConsumer {
    handler: Arc<dyn IdentityEventHandler>,
}

impl BusConsumer {
    pub fn new(handler: Arc<dyn IdentityEventHandler>) -> Self {
        Self { handler }
    }

    /// Process a batch. Never fails; the result is always `Success`.
    #[instrument(skip(self, messages), fields(batch_size = messages.len()))]
    pub async fn process_batch(&self, messages: &[BusMessage]) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            received: messages.len(),
            deleted: 0,
            not_found: 0,
            skipped: 0,
            failed: 0,
            result: ConsumeResult::Success,
        };

        for message in messages {
            let union_id = match serde_json::from_slice::<DeletionMessage>(&message.payload) {
                Ok(decoded) if !decoded.union_id.trim().is_empty() => decoded.union_id,
                Ok(_) => {
                    warn!(message_id = %message.id, "Skipping message with empty union id");
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Skipping undecodable message");
                    outcome.skipped += 1;
                    continue;
                }
            };

            match self.handler.user_deleted(union_id.trim()).await {
                Ok(DeletionOutcome::Deleted) => outcome.deleted += 1,
                Ok(DeletionOutcome::NotFound) => {
                    debug!(message_id = %message.id, union_id = %union_id, "User already absent");
                    outcome.not_found += 1;
                }
                Err(e) => {
                    error!(message_id = %message.id, union_id = %union_id, error = %e, "Deletion failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            deleted = outcome.deleted,
            not_found = outcome.not_found,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Batch processed"
        );
        outcome
    }

    /// Consume until the subscription ends.
    ///
    /// Errors from the subscription itself are logged and the loop goes on.
    pub async fn run<S>(&self, mut subscription: S)
    where
        S: MessageSubscription,
    {
        info!("Starting consumer loop");

        loop {
            let batch = match subscription.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Error receiving batch");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let outcome = self.process_batch(&batch).await;
            if let Err(e) = subscription.ack(outcome.result).await {
                error!(error = %e, "Failed to acknowledge batch");
            }
        }

        info!("Consumer loop ended");
    }
}

impl std::fmt::Debug for BusConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConsumer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_both_spellings() {
        let a: DeletionMessage = serde_json::from_str(r#"{"unionId":"on_1"}"#).unwrap();
        let b: DeletionMessage = serde_json::from_str(r#"{"union_id":"on_2","x":1}"#).unwrap();
        assert_eq!(a.union_id, "on_1");
        assert_eq!(b.union_id, "on_2");
        assert!(serde_json::from_str::<DeletionMessage>(r#"{"id":"on_3"}"#).is_err());
    }
}
