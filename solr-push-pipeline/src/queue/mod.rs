//! Queue module for the solr push pipeline.
//!
//! The queue transport itself lives outside the pipeline; this module
//! defines the interface the pipeline consumes, an in-process
//! implementation, and the receive loop that feeds the workers.

mod memory;
mod receiver;

pub use memory::MemoryQueue;
pub use receiver::{QueueReceiver, ReceiverConfig};
pub(crate) use receiver::shutdown_requested;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use solr_push_shared::InboundMessage;

/// Largest number of messages a transport handles in one batch call.
pub const DEFAULT_MAX_BLOCK_COUNT: usize = 10;

/// Errors reported by a queue transport.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The call failed as a whole.
    #[error("Queue transport error: {0}")]
    Transport(String),

    /// The transport does not implement the operation.
    #[error("Queue operation not supported: {0}")]
    Unsupported(&'static str),
}

impl QueueError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Interface to the work queue.
///
/// Batch calls accept at most `max_block_count()` messages. Per-item
/// results are returned in the order the messages were given; an `Err`
/// means the call failed as a whole and no item result is known.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receive up to `max_count` messages, waiting at most `wait` for the first one.
    async fn receive_batch(
        &self,
        max_count: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, QueueError>;

    /// Delete the given deliveries.
    async fn batch_delete(&self, messages: &[InboundMessage]) -> Result<Vec<bool>, QueueError>;

    /// Resubmit messages for immediate redelivery.
    async fn batch_put(&self, _messages: &[InboundMessage]) -> Result<Vec<bool>, QueueError> {
        Err(QueueError::Unsupported("batch_put"))
    }

    /// Largest block accepted by the batch calls.
    fn max_block_count(&self) -> usize {
        DEFAULT_MAX_BLOCK_COUNT
    }
}
