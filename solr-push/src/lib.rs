//! # Solr Push
//!
//! Entry point and configuration for running the solr push pipeline.
//!
//! The queue transport is supplied by the embedding program; everything
//! else is configured from the environment.

pub mod config;
pub mod telemetry;

pub use config::{Dependencies, ServiceConfig};

use thiserror::Error;

/// Errors that can occur during service initialization or execution.
#[derive(Error, Debug)]
pub enum PushError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] solr_push_pipeline::PipelineError),

    /// Index error.
    #[error("Index error: {0}")]
    Index(#[from] solr_push_repository::IndexError),
}

impl PushError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
