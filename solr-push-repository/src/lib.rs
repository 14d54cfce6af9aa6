//! # Solr Push Repository
//!
//! This crate provides the index backend interface used by the pipeline and
//! its Solr implementation: the wire client, response parsing, and the
//! failure decoder that locates the document responsible for a rejected
//! batch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod solr;
pub mod types;

pub use config::SolrConfig;
pub use errors::IndexError;
pub use interfaces::IndexBackend;
pub use solr::{FailureDecoder, FailureMatcher, SolrClient};
pub use types::{BatchOperation, FailedDocument, FlushOutcome};
