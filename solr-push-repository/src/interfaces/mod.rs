//! Interface definitions for the index backend.
//!
//! The pipeline only ever talks to the backend through `IndexBackend`, so
//! tests can substitute an in-memory implementation.

mod index_backend;

pub use index_backend::IndexBackend;
