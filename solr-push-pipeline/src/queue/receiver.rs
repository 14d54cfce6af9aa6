//! Queue receive loop.
//!
//! Polls the queue transport and forwards every message into the shared
//! worker channel. When the channel is full the loop blocks, which throttles
//! intake to what the workers can absorb.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use solr_push_shared::InboundMessage;

use crate::errors::PipelineError;
use crate::queue::{QueueTransport, DEFAULT_MAX_BLOCK_COUNT};

/// Configuration for the receive loop.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Messages requested per receive call.
    pub max_messages: usize,
    /// Long-poll wait per receive call.
    pub poll_wait: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_BLOCK_COUNT,
            poll_wait: Duration::from_secs(15),
        }
    }
}

/// Feeds received messages into the worker channel.
pub struct QueueReceiver {
    queue: Arc<dyn QueueTransport>,
    sender: Sender<InboundMessage>,
    config: ReceiverConfig,
}

impl QueueReceiver {
    /// Create a receive loop for `queue` sending into `sender`.
    pub fn new(
        queue: Arc<dyn QueueTransport>,
        sender: Sender<InboundMessage>,
        config: ReceiverConfig,
    ) -> Self {
        Self {
            queue,
            sender,
            config,
        }
    }

    /// Run until shutdown, a queue error, or every worker has gone away.
    ///
    /// Shutdown is requested by setting `shutdown` to true. The channel is
    /// closed on exit so the workers drain and stop.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), PipelineError> {
        info!(
            max_messages = self.config.max_messages,
            poll_wait_secs = self.config.poll_wait.as_secs(),
            "Starting queue receiver"
        );

        let result = loop {
            // Only the wait for the queue is interruptible: received messages
            // are always handed to the workers.
            let received = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Receiver received shutdown signal");
                    break Ok(());
                }
                received = self
                    .queue
                    .receive_batch(self.config.max_messages, self.config.poll_wait) => received,
            };

            let forwarded = match received {
                Ok(messages) => self.forward(messages).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = forwarded {
                error!(error = %e, "Queue receiver stopping");
                break Err(e);
            }
        };

        self.sender.close();
        result
    }

    async fn forward(&self, messages: Vec<InboundMessage>) -> Result<(), PipelineError> {
        if messages.is_empty() {
            debug!("No records available");
            return Ok(());
        }

        debug!(count = messages.len(), "Received messages");
        for message in messages {
            if self.sender.send(message).await.is_err() {
                warn!("Worker channel closed, stopping receiver");
                return Err(PipelineError::channel("worker channel closed"));
            }
        }

        Ok(())
    }
}

/// Resolves once shutdown has been requested, or the requester is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;

    #[tokio::test]
    async fn test_forwards_messages_in_order() {
        let queue = Arc::new(MemoryQueue::new());
        for i in 0..3 {
            queue.send_document(format!("d{}", i), "<doc/>");
        }

        let (tx, rx) = async_channel::bounded(10);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = QueueReceiver::new(
            queue.clone(),
            tx,
            ReceiverConfig {
                max_messages: 10,
                poll_wait: Duration::from_millis(10),
            },
        );
        let handle = tokio::spawn(receiver.run(shutdown_rx));

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(rx.recv().await.unwrap().document_id);
        }
        assert_eq!(ids, vec!["d0", "d1", "d2"]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(rx.is_closed());
    }

    #[tokio::test]
    async fn test_stops_when_workers_are_gone() {
        let queue = Arc::new(MemoryQueue::new());
        queue.send_document("a", "<doc/>");

        let (tx, rx) = async_channel::bounded(1);
        drop(rx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = QueueReceiver::new(queue, tx, ReceiverConfig::default());

        let result = receiver.run(shutdown_rx).await;
        assert!(matches!(result, Err(PipelineError::Channel(_))));
    }

    #[tokio::test]
    async fn test_blocks_while_channel_is_full() {
        let queue = Arc::new(MemoryQueue::new());
        for i in 0..3 {
            queue.send_document(format!("d{}", i), "<doc/>");
        }

        let (tx, rx) = async_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = QueueReceiver::new(
            queue.clone(),
            tx,
            ReceiverConfig {
                max_messages: 1,
                poll_wait: Duration::from_millis(10),
            },
        );
        let handle = tokio::spawn(receiver.run(shutdown_rx));

        // One message fills the channel, the next one is held by the receiver.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.len(), 1);
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(queue.in_flight_len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.ready_len(), 1);

        assert_eq!(rx.recv().await.unwrap().document_id, "d0");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.len(), 1);
        assert_eq!(queue.ready_len(), 0);

        assert_eq!(rx.recv().await.unwrap().document_id, "d1");
        assert_eq!(rx.recv().await.unwrap().document_id, "d2");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_requested_before_start() {
        let queue = Arc::new(MemoryQueue::new());
        let (tx, rx) = async_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let receiver = QueueReceiver::new(queue, tx, ReceiverConfig::default());
        receiver.run(shutdown_rx).await.unwrap();
        assert!(rx.is_closed());
    }
}
