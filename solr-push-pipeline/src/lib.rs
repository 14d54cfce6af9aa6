//! # Solr Push Pipeline
//!
//! This crate provides the pipeline components that move documents from a
//! work queue into a Solr core.
//!
//! ## Architecture
//!
//! 1. **Receiver**: polls the queue and feeds a shared bounded channel
//! 2. **Workers**: buffer documents, flush them to the index and recover
//!    from rejected documents
//! 3. **Acknowledger**: deletes indexed messages from the queue in blocks
//! 4. **Pool**: runs and supervises the workers
//! 5. **Orchestrator**: wires everything together and handles shutdown

pub mod ack;
pub mod buffer;
pub mod errors;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::PipelineError;
