//! Configuration types for the Solr client.

use std::time::Duration;

use url::Url;

use crate::errors::IndexError;

/// Configuration for the Solr client.
#[derive(Debug, Clone)]
pub struct SolrConfig {
    /// Solr base URL, e.g. `http://localhost:8983/solr`.
    pub base_url: String,
    /// Name of the core (collection) documents are sent to.
    pub core: String,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
    /// Total attempts for a request failing with a transient transport error.
    pub max_attempts: u32,
    /// Fixed sleep between attempts.
    pub retry_delay: Duration,
    /// Idle connections kept per host.
    pub max_idle_per_host: usize,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8983/solr".to_string(),
            core: "test_core".to_string(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
            max_idle_per_host: 5,
        }
    }
}

impl SolrConfig {
    /// Create a config for the given endpoint with default tuning.
    pub fn new(base_url: impl Into<String>, core: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            core: core.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// URL of the update handler.
    pub fn update_url(&self) -> Result<Url, IndexError> {
        self.core_url("update")
    }

    /// URL of the ping handler.
    pub fn ping_url(&self) -> Result<Url, IndexError> {
        self.core_url("admin/ping")
    }

    fn core_url(&self, path: &str) -> Result<Url, IndexError> {
        let raw = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.core.trim_matches('/'),
            path
        );
        Url::parse(&raw).map_err(|e| IndexError::request(format!("Invalid Solr URL {}: {}", raw, e)))
    }
}
