//! Error types for the solr push pipeline.

use solr_push_repository::IndexError;
use thiserror::Error;

use crate::queue::QueueError;

/// Errors that can occur in the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Unrecoverable error from the index backend.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Error from the queue transport.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A worker stopped with an error the supervisor would not absorb.
    #[error("Worker {worker_id} failed: {source}")]
    WorkerFailed {
        worker_id: usize,
        #[source]
        source: Box<PipelineError>,
    },

    /// Invalid pipeline configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A spawned task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),
}

impl PipelineError {
    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a task error.
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// Wrap an error as the failure of a specific worker.
    pub fn worker_failed(worker_id: usize, source: PipelineError) -> Self {
        Self::WorkerFailed {
            worker_id,
            source: Box::new(source),
        }
    }
}
