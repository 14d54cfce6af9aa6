//! In-process queue transport.
//!
//! Models the parts of a hosted queue the pipeline depends on: a received
//! message stays invisible (in flight) until it is deleted, and each
//! delivery gets a fresh delete handle. Redelivery after a visibility
//! timeout is triggered explicitly with `expire_in_flight`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use solr_push_shared::InboundMessage;

use crate::queue::{QueueError, QueueTransport, DEFAULT_MAX_BLOCK_COUNT};

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    deleted: Vec<String>,
    delete_calls: Vec<usize>,
    put_count: usize,
    failing_deletes: HashSet<String>,
    failing_delete_calls: usize,
}

/// Queue transport held entirely in memory.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<State>,
    arrivals: Notify,
    max_block_count: usize,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    /// Create an empty queue with the default block size.
    pub fn new() -> Self {
        Self::with_max_block_count(DEFAULT_MAX_BLOCK_COUNT)
    }

    /// Create an empty queue accepting at most `max_block_count` items per batch call.
    pub fn with_max_block_count(max_block_count: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrivals: Notify::new(),
            max_block_count,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a message.
    pub fn send(&self, payload: impl Into<Vec<u8>>, attributes: HashMap<String, String>) {
        self.state().ready.push_back(StoredMessage {
            payload: payload.into(),
            attributes,
        });
        self.arrivals.notify_one();
    }

    /// Enqueue a document with the given identifier.
    pub fn send_document(&self, document_id: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let mut attributes = HashMap::new();
        attributes.insert(
            solr_push_shared::RECORD_ID_ATTRIBUTE.to_string(),
            document_id.into(),
        );
        self.send(payload, attributes);
    }

    /// Make every in-flight delivery visible again, as a visibility timeout would.
    pub fn expire_in_flight(&self) -> usize {
        let mut state = self.state();
        let expired: Vec<StoredMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        let count = expired.len();
        state.ready.extend(expired);
        drop(state);
        if count > 0 {
            self.arrivals.notify_one();
        }
        count
    }

    /// Make deletes of this document report failure.
    pub fn fail_deletes_for(&self, document_id: impl Into<String>) {
        self.state().failing_deletes.insert(document_id.into());
    }

    /// Make the next `calls` delete calls fail as a whole.
    pub fn fail_delete_calls(&self, calls: usize) {
        self.state().failing_delete_calls = calls;
    }

    /// Document identifiers deleted so far, in deletion order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    /// Size of every delete call made so far.
    pub fn delete_calls(&self) -> Vec<usize> {
        self.state().delete_calls.clone()
    }

    /// Number of messages resubmitted through `batch_put`.
    pub fn put_count(&self) -> usize {
        self.state().put_count
    }

    /// Messages waiting to be received.
    pub fn ready_len(&self) -> usize {
        self.state().ready.len()
    }

    /// Messages received but not yet deleted.
    pub fn in_flight_len(&self) -> usize {
        self.state().in_flight.len()
    }

    fn take_ready(&self, max_count: usize) -> Vec<InboundMessage> {
        let mut state = self.state();
        let count = max_count.min(state.ready.len());
        let mut received = Vec::with_capacity(count);

        let drained: Vec<StoredMessage> = state.ready.drain(..count).collect();
        for stored in drained {
            let handle = Uuid::new_v4().to_string();
            received.push(InboundMessage::new(
                stored.payload.clone(),
                handle.clone(),
                stored.attributes.clone(),
            ));
            state.in_flight.insert(handle, stored);
        }

        received
    }

    fn check_block(&self, len: usize) -> Result<(), QueueError> {
        if len > self.max_block_count {
            return Err(QueueError::transport(format!(
                "Batch of {} exceeds maximum of {}",
                len, self.max_block_count
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn receive_batch(
        &self,
        max_count: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, QueueError> {
        let received = self.take_ready(max_count);
        if !received.is_empty() {
            return Ok(received);
        }

        if tokio::time::timeout(wait, self.arrivals.notified())
            .await
            .is_err()
        {
            return Ok(Vec::new());
        }

        Ok(self.take_ready(max_count))
    }

    async fn batch_delete(&self, messages: &[InboundMessage]) -> Result<Vec<bool>, QueueError> {
        self.check_block(messages.len())?;

        let mut state = self.state();
        if state.failing_delete_calls > 0 {
            state.failing_delete_calls -= 1;
            return Err(QueueError::transport("scripted delete failure"));
        }
        state.delete_calls.push(messages.len());

        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            if state.failing_deletes.contains(&message.document_id) {
                results.push(false);
                continue;
            }
            let removed = state.in_flight.remove(&message.delete_handle).is_some();
            if removed {
                state.deleted.push(message.document_id.clone());
            }
            results.push(removed);
        }

        debug!(count = messages.len(), "Deleted block");
        Ok(results)
    }

    async fn batch_put(&self, messages: &[InboundMessage]) -> Result<Vec<bool>, QueueError> {
        self.check_block(messages.len())?;

        let mut state = self.state();
        for message in messages {
            state.in_flight.remove(&message.delete_handle);
            state.ready.push_back(StoredMessage {
                payload: message.payload.clone(),
                attributes: message.attributes.clone(),
            });
            state.put_count += 1;
        }
        drop(state);

        self.arrivals.notify_one();
        Ok(vec![true; messages.len()])
    }

    fn max_block_count(&self) -> usize {
        self.max_block_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_hides_message_until_deleted() {
        let queue = MemoryQueue::new();
        queue.send_document("a", "<doc/>");

        let received = queue.receive_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].document_id, "a");
        assert_eq!(queue.ready_len(), 0);
        assert_eq!(queue.in_flight_len(), 1);

        let results = queue.batch_delete(&received).await.unwrap();
        assert_eq!(results, vec![true]);
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(queue.deleted_ids(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_receive_respects_max_count() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue.send_document(format!("d{}", i), "<doc/>");
        }

        let received = queue.receive_batch(3, Duration::ZERO).await.unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(queue.ready_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_receive_times_out() {
        let queue = MemoryQueue::new();
        let received = queue
            .receive_batch(10, Duration::from_secs(15))
            .await
            .unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_expired_messages_are_redelivered_with_new_handles() {
        let queue = MemoryQueue::new();
        queue.send_document("a", "<doc/>");
        let first = queue.receive_batch(10, Duration::ZERO).await.unwrap();

        assert_eq!(queue.expire_in_flight(), 1);
        let second = queue.receive_batch(10, Duration::ZERO).await.unwrap();

        assert_eq!(second[0].document_id, "a");
        assert_ne!(first[0].delete_handle, second[0].delete_handle);
        // The stale handle no longer deletes anything.
        assert_eq!(queue.batch_delete(&first).await.unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_oversized_block_is_rejected() {
        let queue = MemoryQueue::with_max_block_count(2);
        for i in 0..3 {
            queue.send_document(format!("d{}", i), "<doc/>");
        }
        let received = queue.receive_batch(3, Duration::ZERO).await.unwrap();
        assert!(matches!(
            queue.batch_delete(&received).await,
            Err(QueueError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_put_makes_message_ready_again() {
        let queue = MemoryQueue::new();
        queue.send_document("a", "<doc/>");
        let received = queue.receive_batch(10, Duration::ZERO).await.unwrap();

        assert_eq!(queue.batch_put(&received).await.unwrap(), vec![true]);
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(queue.put_count(), 1);
    }
}
