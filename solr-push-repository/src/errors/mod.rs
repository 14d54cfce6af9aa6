//! Error types for the solr push repository.

mod index_error;

pub use index_error::IndexError;
