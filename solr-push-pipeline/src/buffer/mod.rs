//! Buffer module for the solr push pipeline.
//!
//! Decides when accumulated documents are sent to the index (flush) and
//! when the index is asked to make them durable (commit). How documents
//! arrive is the worker's business.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument};

use solr_push_repository::{BatchOperation, FlushOutcome, IndexBackend, IndexError};

/// Configuration for the index buffer.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// What the batches do (add or delete).
    pub operation: BatchOperation,
    /// Flush once this many documents are buffered.
    pub block_count: usize,
    /// Flush once the serialized batch reaches this many bytes.
    pub buffer_bytes: usize,
    /// Flush once the oldest buffered document has waited this long.
    pub flush_interval: Duration,
    /// Commit once flushed documents have been uncommitted this long.
    /// Zero disables explicit commits.
    pub commit_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            operation: BatchOperation::default(),
            block_count: 250,
            buffer_bytes: 2 * 1024 * 1024,
            flush_interval: Duration::from_secs(30),
            commit_interval: Duration::from_secs(180),
        }
    }
}

/// Per-worker buffer/flush/commit state machine.
pub struct IndexBuffer {
    worker_id: usize,
    backend: Arc<dyn IndexBackend>,
    config: BufferConfig,
    payload: Vec<u8>,
    pending_ids: Vec<String>,
    last_flush: Instant,
    last_commit: Instant,
    dirty: bool,
}

impl IndexBuffer {
    /// Create an empty buffer sending to `backend`.
    pub fn new(worker_id: usize, backend: Arc<dyn IndexBackend>, config: BufferConfig) -> Self {
        let now = Instant::now();
        Self {
            worker_id,
            backend,
            payload: Vec::new(),
            pending_ids: Vec::new(),
            config,
            last_flush: now,
            last_commit: now,
            dirty: false,
        }
    }

    /// Append a document to the pending batch.
    pub fn buffer_document(&mut self, id: &str, document: &[u8]) {
        if self.pending_ids.is_empty() {
            self.payload
                .extend_from_slice(self.config.operation.open_tag().as_bytes());
            // Flush timing starts with the first document, not the last flush.
            self.last_flush = Instant::now();
        }

        self.payload.extend_from_slice(document);
        self.pending_ids.push(id.to_string());
    }

    /// Number of buffered documents.
    pub fn pending_count(&self) -> usize {
        self.pending_ids.len()
    }

    /// Size of the serialized batch so far.
    pub fn buffered_bytes(&self) -> usize {
        self.payload.len()
    }

    /// Whether flushed documents are waiting for a commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether explicit commits are enabled at all.
    pub fn commits_enabled(&self) -> bool {
        !self.config.commit_interval.is_zero()
    }

    /// Whether the pending batch should be sent now.
    pub fn is_time_to_flush(&self) -> bool {
        let pending = self.pending_count();
        if pending == 0 {
            return false;
        }

        if pending >= self.config.block_count {
            debug!(worker_id = self.worker_id, pending = pending, "Reached send block count");
            return true;
        }

        if self.payload.len() >= self.config.buffer_bytes {
            debug!(
                worker_id = self.worker_id,
                bytes = self.payload.len(),
                "Reached send buffer size"
            );
            return true;
        }

        if self.last_flush.elapsed() > self.config.flush_interval {
            debug!(worker_id = self.worker_id, "Reached send timeout");
            return true;
        }

        false
    }

    /// Whether a commit should be issued now.
    pub fn is_time_to_commit(&self) -> bool {
        if !self.dirty || !self.commits_enabled() {
            return false;
        }
        self.last_commit.elapsed() > self.config.commit_interval
    }

    /// Send the pending batch.
    ///
    /// The buffer is emptied whatever the outcome: a batch is never resent
    /// verbatim, the caller re-buffers the documents it wants to retry.
    #[instrument(skip(self), fields(worker_id = self.worker_id))]
    pub async fn force_flush(&mut self) -> Result<FlushOutcome, IndexError> {
        if self.pending_ids.is_empty() {
            return Ok(FlushOutcome::Success);
        }

        self.payload
            .extend_from_slice(self.config.operation.close_tag().as_bytes());

        let count = self.pending_ids.len();
        info!(
            count = count,
            bytes = self.payload.len(),
            "Sending documents to index"
        );
        debug!(ids = %self.pending_ids.join(" "), "Batch document ids");

        let start = Instant::now();
        let result = self.backend.add(&self.payload).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.payload.clear();
        self.pending_ids.clear();
        self.last_flush = Instant::now();

        if let Ok(outcome) = &result {
            if outcome.added_documents() {
                // Commit timing measures time since the index became dirty.
                if !self.dirty {
                    self.last_commit = Instant::now();
                }
                self.dirty = true;
            }

            match outcome {
                FlushOutcome::Success => {
                    info!(count = count, duration_ms = duration_ms, "Added documents")
                }
                FlushOutcome::PartialFailure { .. } => {
                    info!(count = count, duration_ms = duration_ms, "Added some documents")
                }
                FlushOutcome::TotalFailure { .. } => {
                    info!(count = count, duration_ms = duration_ms, "Added no documents")
                }
            }
        }

        result
    }

    /// Commit flushed documents. Does nothing when nothing is uncommitted.
    #[instrument(skip(self), fields(worker_id = self.worker_id))]
    pub async fn force_commit(&mut self) -> Result<(), IndexError> {
        if !self.dirty {
            return Ok(());
        }

        let start = Instant::now();
        self.backend.commit().await?;

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Commit completed"
        );

        self.last_commit = Instant::now();
        self.dirty = false;
        Ok(())
    }
}
