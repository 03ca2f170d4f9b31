//! In-process message bus over a tokio channel.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bus::{BusMessage, ConsumeResult, MessageSubscription};
use crate::error::EventError;

/// Factory for a connected publisher/subscription pair.
#[derive(Debug)]
pub struct MemoryBus;

impl MemoryBus {
    /// Create a bus delivering at most `batch_size` messages per batch.
    #[must_use]
    pub fn channel(batch_size: usize) -> (MemoryPublisher, MemorySubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let acked = Arc::new(AtomicU64::new(0));
        (
            MemoryPublisher {
                tx,
                next_id: Arc::new(AtomicU64::new(0)),
                acked: Arc::clone(&acked),
            },
            MemorySubscription {
                rx,
                batch_size: batch_size.max(1),
                acked,
            },
        )
    }
}

/// Sending half. Dropping every publisher ends the subscription once the
/// queued messages are drained.
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<BusMessage>,
    next_id: Arc<AtomicU64>,
    acked: Arc<AtomicU64>,
}

impl MemoryPublisher {
    /// Queue a payload. Fails once the subscription has been dropped.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> Result<(), EventError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(BusMessage::new(format!("mem-{id}"), payload))
            .map_err(|_| EventError::ConsumeFailed {
                topic: "memory".to_string(),
                cause: "subscription dropped".to_string(),
            })
    }

    /// Number of batches acknowledged so far.
    pub fn acked_batches(&self) -> u64 {
        self.acked.load(Ordering::SeqCst)
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<BusMessage>,
    batch_size: usize,
    acked: Arc<AtomicU64>,
}

#[async_trait]
impl MessageSubscription for MemorySubscription {
    async fn next_batch(&mut self) -> Result<Option<Vec<BusMessage>>, EventError> {
        let Some(first) = self.rx.recv().await else {
            return Ok(None);
        };

        let mut batch = vec![first];
        while batch.len() < self.batch_size {
            match self.rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        Ok(Some(batch))
    }

    async fn ack(&mut self, _result: ConsumeResult) -> Result<(), EventError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batches_respect_size() {
        let (publisher, mut subscription) = MemoryBus::channel(2);
        for i in 0..3 {
            publisher.publish(format!("{{\"unionId\":\"on_{i}\"}}")).unwrap();
        }
        drop(publisher);

        let first = subscription.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "mem-0");

        let second = subscription.next_batch().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);

        assert!(subscription.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ack_is_counted() {
        let (publisher, mut subscription) = MemoryBus::channel(8);
        subscription.ack(ConsumeResult::Success).await.unwrap();
        assert_eq!(publisher.acked_batches(), 1);
    }
}
