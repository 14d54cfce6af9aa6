//! Worker module for the solr push pipeline.
//!
//! A worker takes messages from the shared channel, buffers them, sends
//! them to the index when the buffer says so and acknowledges what was
//! indexed. Rejected documents are peeled off one flush at a time until the
//! rest of the batch goes through.

mod recovery;

pub use recovery::{parent_id, plan_recovery, Recovery, FIRST_POSITION_MARKER};

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use tracing::{debug, error, info, instrument, warn};

use solr_push_repository::IndexBackend;
use solr_push_shared::InboundMessage;

use crate::ack::{AckFailurePolicy, Acknowledger};
use crate::buffer::{BufferConfig, IndexBuffer};
use crate::errors::PipelineError;
use crate::queue::QueueTransport;

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to wait for a message before re-checking the timers.
    pub wait_timeout: Duration,
    /// Separator between a parent document id and a sub-document suffix.
    pub sub_document_delimiter: Option<String>,
    /// Flush and commit thresholds.
    pub buffer: BufferConfig,
    /// What to do with messages whose delete failed.
    pub ack_policy: AckFailurePolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(5),
            sub_document_delimiter: None,
            buffer: BufferConfig::default(),
            ack_policy: AckFailurePolicy::default(),
        }
    }
}

/// One indexing worker.
pub struct Worker {
    id: usize,
    config: WorkerConfig,
    backend: Arc<dyn IndexBackend>,
    buffer: IndexBuffer,
    acknowledger: Acknowledger,
    inbound: Receiver<InboundMessage>,
    queued: Vec<InboundMessage>,
}

impl Worker {
    /// Create a worker reading from `inbound` and indexing into `backend`.
    pub fn new(
        id: usize,
        config: WorkerConfig,
        backend: Arc<dyn IndexBackend>,
        queue: Arc<dyn QueueTransport>,
        inbound: Receiver<InboundMessage>,
    ) -> Self {
        let buffer = IndexBuffer::new(id, backend.clone(), config.buffer.clone());
        let acknowledger = Acknowledger::new(id, queue, config.ack_policy);
        Self {
            id,
            buffer,
            acknowledger,
            backend,
            inbound,
            queued: Vec::new(),
            config,
        }
    }

    /// Run until the inbound channel is closed or an unrecoverable error occurs.
    ///
    /// Anything still buffered when the channel closes is flushed before
    /// returning, and committed unless explicit commits are disabled.
    #[instrument(skip(self), fields(worker_id = self.id))]
    pub async fn run(mut self) -> Result<(), PipelineError> {
        self.backend.ping().await?;
        info!("Worker started");

        loop {
            match tokio::time::timeout(self.config.wait_timeout, self.inbound.recv()).await {
                Ok(Ok(message)) => {
                    self.buffer
                        .buffer_document(&message.document_id, &message.payload);
                    self.queued.push(message);
                }
                Ok(Err(_)) => {
                    info!(pending = self.queued.len(), "Inbound channel closed, draining");
                    break;
                }
                Err(_) => {
                    debug!("No message within wait timeout");
                }
            }

            if self.buffer.is_time_to_flush() {
                self.flush_queued().await?;
            }

            if self.buffer.is_time_to_commit() {
                self.buffer.force_commit().await?;
            }
        }

        self.flush_queued().await?;
        if self.buffer.commits_enabled() {
            self.buffer.force_commit().await?;
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Flush the buffer, resending survivors until nothing is left to retry.
    async fn flush_queued(&mut self) -> Result<(), PipelineError> {
        while self.buffer.pending_count() > 0 {
            let outcome = self.buffer.force_flush().await?;
            let queued = mem::take(&mut self.queued);
            let recovery = plan_recovery(
                queued,
                &outcome,
                self.config.sub_document_delimiter.as_deref(),
            );

            self.acknowledger
                .acknowledge_all(&recovery.acknowledge)
                .await;

            if let Some(discarded) = &recovery.discarded {
                error!(
                    document_id = %discarded.document_id,
                    bytes = discarded.payload_len(),
                    received_at = %discarded.received_at,
                    "Document rejected by index, dropping it"
                );
            }

            if !recovery.abandoned.is_empty() {
                warn!(
                    count = recovery.abandoned.len(),
                    "Could not identify the failed document, abandoning batch"
                );
            }

            if recovery.needs_retry() {
                info!(count = recovery.retry.len(), "Resending remaining documents");
            }
            for message in recovery.retry {
                self.buffer
                    .buffer_document(&message.document_id, &message.payload);
                self.queued.push(message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::testing::MockBackend;
    use solr_push_repository::{FailedDocument, FlushOutcome, IndexError};

    fn config(block_count: usize) -> WorkerConfig {
        WorkerConfig {
            wait_timeout: Duration::from_millis(20),
            sub_document_delimiter: None,
            buffer: BufferConfig {
                block_count,
                commit_interval: Duration::ZERO,
                ..BufferConfig::default()
            },
            ack_policy: AckFailurePolicy::Abandon,
        }
    }

    /// Move every queued document into the channel and close it.
    async fn feed(queue: &MemoryQueue, ids: &[&str]) -> Receiver<InboundMessage> {
        for id in ids {
            queue.send_document(*id, format!("<doc>{}</doc>", id));
        }
        let (tx, rx) = async_channel::unbounded();
        let mut received = 0;
        while received < ids.len() {
            let batch = queue
                .receive_batch(queue.max_block_count(), Duration::ZERO)
                .await
                .unwrap();
            received += batch.len();
            for message in batch {
                tx.send(message).await.unwrap();
            }
        }
        tx.close();
        rx
    }

    #[tokio::test]
    async fn test_indexes_and_acknowledges_batch() {
        let backend = Arc::new(MockBackend::new());
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a", "b", "c"]).await;

        let worker = Worker::new(0, config(3), backend.clone(), queue.clone(), rx);
        worker.run().await.unwrap();

        assert_eq!(backend.ping_count(), 1);
        assert_eq!(
            backend.payloads(),
            vec!["<add><doc>a</doc><doc>b</doc><doc>c</doc></add>".to_string()]
        );
        assert_eq!(queue.deleted_ids(), vec!["a", "b", "c"]);
        assert_eq!(queue.in_flight_len(), 0);
        // Explicit commits are disabled.
        assert_eq!(backend.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_commits_when_commits_enabled() {
        let backend = Arc::new(MockBackend::new());
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a", "b"]).await;

        let mut config = config(10);
        config.buffer.commit_interval = Duration::from_secs(60);
        let worker = Worker::new(0, config, backend.clone(), queue.clone(), rx);
        worker.run().await.unwrap();

        assert_eq!(backend.payloads().len(), 1);
        assert_eq!(queue.deleted_ids(), vec!["a", "b"]);
        assert_eq!(backend.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_drain_with_commits_disabled_sends_no_commit() {
        let backend = Arc::new(MockBackend::new());
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a"]).await;

        let worker = Worker::new(0, config(10), backend.clone(), queue.clone(), rx);
        worker.run().await.unwrap();

        assert_eq!(backend.payloads().len(), 1);
        assert_eq!(queue.deleted_ids(), vec!["a"]);
        assert_eq!(backend.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_drops_culprit_and_resends_rest() {
        let backend = Arc::new(MockBackend::new());
        backend.push_outcome(Ok(FlushOutcome::PartialFailure { position: 2 }));
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a", "b", "c", "d", "e"]).await;

        let worker = Worker::new(0, config(5), backend.clone(), queue.clone(), rx);
        worker.run().await.unwrap();

        let payloads = backend.payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1], "<add><doc>d</doc><doc>e</doc></add>");
        assert!(!payloads[1].contains("<doc>c</doc>"));

        assert_eq!(queue.deleted_ids(), vec!["a", "b", "d", "e"]);
        // The rejected document stays in flight and is never deleted.
        assert_eq!(queue.in_flight_len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_by_id_resends_others() {
        let backend = Arc::new(MockBackend::new());
        backend.push_outcome(Ok(FlushOutcome::TotalFailure {
            failed: Some(FailedDocument::Identifier("b".to_string())),
        }));
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a", "b", "c"]).await;

        let worker = Worker::new(0, config(3), backend.clone(), queue.clone(), rx);
        worker.run().await.unwrap();

        let payloads = backend.payloads();
        assert_eq!(payloads[1], "<add><doc>a</doc><doc>c</doc></add>");
        assert_eq!(queue.deleted_ids(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_unidentified_failure_abandons_batch() {
        let backend = Arc::new(MockBackend::new());
        backend.push_outcome(Ok(FlushOutcome::TotalFailure { failed: None }));
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a", "b"]).await;

        let worker = Worker::new(0, config(2), backend.clone(), queue.clone(), rx);
        worker.run().await.unwrap();

        assert_eq!(backend.payloads().len(), 1);
        assert!(queue.deleted_ids().is_empty());
        assert_eq!(queue.in_flight_len(), 2);
        // Nothing reached the index, so there is nothing to commit.
        assert_eq!(backend.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_fatal_flush_error_stops_worker() {
        let backend = Arc::new(MockBackend::new());
        backend.push_outcome(Err(IndexError::protocol("no status")));
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a"]).await;

        let worker = Worker::new(0, config(1), backend.clone(), queue.clone(), rx);
        let result = worker.run().await;

        assert!(matches!(result, Err(PipelineError::Index(IndexError::Protocol(_)))));
        assert!(queue.deleted_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_ping_stops_worker_before_reading() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_ping();
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a"]).await;

        let worker = Worker::new(0, config(1), backend.clone(), queue.clone(), rx.clone());
        assert!(worker.run().await.is_err());
        assert!(backend.payloads().is_empty());
        assert_eq!(rx.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_is_fatal() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_commits();
        let queue = Arc::new(MemoryQueue::new());
        let rx = feed(&queue, &["a"]).await;

        let mut config = config(1);
        config.buffer.commit_interval = Duration::from_secs(60);
        let worker = Worker::new(0, config, backend.clone(), queue.clone(), rx);
        let result = worker.run().await;

        assert!(matches!(result, Err(PipelineError::Index(IndexError::Commit(_)))));
        // The flush itself succeeded and was acknowledged.
        assert_eq!(queue.deleted_ids(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commits_when_interval_elapses() {
        let backend = Arc::new(MockBackend::new());
        let queue = Arc::new(MemoryQueue::new());
        queue.send_document("a", "<doc>a</doc>");
        let received = queue.receive_batch(10, Duration::ZERO).await.unwrap();

        let (tx, rx) = async_channel::unbounded();
        for message in received {
            tx.send(message).await.unwrap();
        }

        let mut config = config(1);
        config.buffer.commit_interval = Duration::from_secs(60);
        let worker = Worker::new(0, config, backend.clone(), queue.clone(), rx);
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.commit_count(), 0);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(backend.commit_count(), 1);

        tx.close();
        handle.await.unwrap().unwrap();
        // Nothing new to commit after the timed commit.
        assert_eq!(backend.commit_count(), 1);
    }
}
