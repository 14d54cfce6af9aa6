//! Index backend trait definition.

use async_trait::async_trait;

use crate::errors::IndexError;
use crate::types::FlushOutcome;

/// Abstract interface for the bulk index backend.
///
/// Each worker owns its own instance, so implementations need not share
/// connection state between workers.
///
/// # Error Handling
///
/// Document-level rejections are reported through `FlushOutcome`. An `Err`
/// always means the operation cannot be recovered by the caller.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Submit a complete, wrapped batch.
    ///
    /// # Arguments
    ///
    /// * `payload` - The serialized batch, wrapper element included
    ///
    /// # Returns
    ///
    /// * `Ok(FlushOutcome)` - How the backend treated the batch
    /// * `Err(IndexError)` - Transport or protocol failure
    async fn add(&self, payload: &[u8]) -> Result<FlushOutcome, IndexError>;

    /// Make previously added documents durable.
    async fn commit(&self) -> Result<(), IndexError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), IndexError>;
}
