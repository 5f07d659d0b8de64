use crate::lock;

use hangar_core::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

struct Stored {
    body: String,
    receipt: Option<String>,
    visible_at: Instant,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Vec<Stored>>,
    deliveries: u64,
}

/// A multi-queue store with SQS-like delivery semantics.
///
/// A received message stays in the queue until it is deleted with the receipt
/// of its latest delivery. It is hidden from other receivers for the
/// visibility timeout, which defaults to zero.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn with_queues<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = names
            .into_iter()
            .map(|name| (name.into(), Vec::new()))
            .collect();

        Self {
            state: Arc::new(Mutex::new(State {
                queues,
                deliveries: 0,
            })),
            visibility_timeout: Duration::ZERO,
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Number of messages in a queue, including ones currently in flight.
    pub fn len(&self, name: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.queues.get(name).map(Vec::len))
            .unwrap_or(0)
    }

    /// Bodies of all messages in a queue, decoded as job messages.
    pub fn messages(&self, name: &str) -> Vec<JobMessage> {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state.queues.get(name).map(|messages| {
                    messages
                        .iter()
                        .filter_map(|m| serde_json::from_str(&m.body).ok())
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// Enqueues a body as-is, without the `{"id": ...}` envelope.
    pub fn push_raw(&self, name: &str, body: impl Into<String>) -> Result<(), QueueError> {
        let mut state = lock(&self.state, QueueError::System)?;
        let messages = state
            .queues
            .get_mut(name)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;

        messages.push(Stored {
            body: body.into(),
            receipt: None,
            visible_at: Instant::now(),
        });
        Ok(())
    }
}

impl WorkQueue for MemoryQueue {
    async fn resolve(&self, name: &str) -> Result<QueueHandle, QueueError> {
        let state = lock(&self.state, QueueError::System)?;
        if state.queues.contains_key(name) {
            Ok(QueueHandle(name.to_string()))
        } else {
            Err(QueueError::NotFound(name.to_string()))
        }
    }

    async fn send(&self, queue: &QueueHandle, message: &JobMessage) -> Result<(), QueueError> {
        let body = serde_json::to_string(message)
            .map_err(|e| QueueError::MalformedMessage(e.to_string()))?;

        self.push_raw(&queue.0, body)
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        max: usize,
        _wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let now = Instant::now();
        let mut guard = lock(&self.state, QueueError::System)?;
        let State { queues, deliveries } = &mut *guard;

        let messages = queues
            .get_mut(&queue.0)
            .ok_or_else(|| QueueError::NotFound(queue.0.clone()))?;

        let mut received = Vec::new();
        for message in messages.iter_mut().filter(|m| m.visible_at <= now).take(max) {
            *deliveries += 1;
            let receipt = format!("{}-{}", queue.0, deliveries);
            message.receipt = Some(receipt.clone());
            message.visible_at = now + self.visibility_timeout;
            received.push(Delivery {
                body: message.body.clone(),
                receipt: ReceiptHandle(receipt),
            });
        }

        Ok(received)
    }

    async fn delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut state = lock(&self.state, QueueError::System)?;
        let messages = state
            .queues
            .get_mut(&queue.0)
            .ok_or_else(|| QueueError::NotFound(queue.0.clone()))?;

        let position = messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt.0.as_str()))
            .ok_or_else(|| QueueError::InvalidReceipt(receipt.0.clone()))?;

        messages.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const Q: &str = "waiting";

    #[tokio::test]
    async fn test_unknown_queue() {
        let queue = MemoryQueue::with_queues([Q]);
        assert!(matches!(
            queue.resolve("missing").await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_message_stays_until_deleted() {
        let queue = MemoryQueue::with_queues([Q]);
        let handle = queue.resolve(Q).await.unwrap();
        let id = Uuid::new_v4();
        queue.send(&handle, &JobMessage { id }).await.unwrap();

        let first = queue.receive(&handle, 10, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message().unwrap().id, id);

        // Not acknowledged, so it is delivered again with a fresh receipt.
        let second = queue.receive(&handle, 10, Duration::ZERO).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].receipt, second[0].receipt);

        assert!(matches!(
            queue.delete(&handle, &first[0].receipt).await,
            Err(QueueError::InvalidReceipt(_))
        ));
        queue.delete(&handle, &second[0].receipt).await.unwrap();
        assert_eq!(queue.len(Q), 0);
    }

    #[tokio::test]
    async fn test_visibility_timeout_hides_in_flight() {
        let queue = MemoryQueue::with_queues([Q]).with_visibility_timeout(Duration::from_secs(30));
        let handle = queue.resolve(Q).await.unwrap();
        for _ in 0..3 {
            queue
                .send(&handle, &JobMessage { id: Uuid::new_v4() })
                .await
                .unwrap();
        }

        let first = queue.receive(&handle, 2, Duration::ZERO).await.unwrap();
        let second = queue.receive(&handle, 2, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(queue.len(Q), 3);
    }
}
