//! Service configuration, read from the environment.

mod dependencies;

pub use dependencies::Dependencies;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use solr_push_pipeline::ack::AckFailurePolicy;
use solr_push_pipeline::buffer::BufferConfig;
use solr_push_pipeline::orchestrator::OrchestratorConfig;
use solr_push_pipeline::pool::{PoolConfig, SupervisorPolicy};
use solr_push_pipeline::queue::ReceiverConfig;
use solr_push_pipeline::worker::WorkerConfig;
use solr_push_repository::{BatchOperation, SolrConfig};

use crate::PushError;

/// Default Solr base URL.
const DEFAULT_SOLR_URL: &str = "http://localhost:8983/solr";

/// Default Solr core.
const DEFAULT_SOLR_CORE: &str = "test_core";

const DEFAULT_SOLR_MODE: &str = "add";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
const DEFAULT_BLOCK_COUNT: usize = 250;
const DEFAULT_BUFFER_SIZE_MB: usize = 2;
const MAX_BUFFER_SIZE_MB: usize = 1024;
const DEFAULT_FLUSH_TIME_SECS: u64 = 30;
const DEFAULT_COMMIT_TIME_SECS: u64 = 180;
const DEFAULT_COMMIT_WITHIN_SECS: u64 = 0;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_WAIT_SECS: u64 = 15;
const DEFAULT_ACK_FAILURE_POLICY: &str = "abandon";
const DEFAULT_WORKER_RESTARTS: usize = 0;

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Solr base URL.
    pub solr_url: String,
    /// Core documents are sent to.
    pub solr_core: String,
    /// Add or delete batches, with the commit-within hint for adds.
    pub operation: BatchOperation,
    /// Number of workers.
    pub workers: usize,
    /// Capacity of the worker channel.
    pub channel_capacity: usize,
    /// Documents per flush.
    pub block_count: usize,
    /// Bytes per flush.
    pub buffer_bytes: usize,
    /// Age of the oldest buffered document that forces a flush.
    pub flush_interval: Duration,
    /// Time between commits. Zero disables explicit commits.
    pub commit_interval: Duration,
    /// Timeout for each Solr request.
    pub request_timeout: Duration,
    /// Separator between a parent id and a sub-document suffix.
    pub sub_document_delimiter: Option<String>,
    /// Queue long-poll wait.
    pub poll_wait: Duration,
    /// What to do with messages whose delete failed.
    pub ack_policy: AckFailurePolicy,
    /// Worker restart budget. Zero fails fast.
    pub worker_restarts: usize,
}

impl ServiceConfig {
    /// Load configuration from the environment, after reading any `.env` file.
    ///
    /// # Environment Variables
    ///
    /// - `SOLR_URL`: Solr base URL (default: http://localhost:8983/solr)
    /// - `SOLR_CORE`: core to index into (default: test_core)
    /// - `SOLR_MODE`: `add` or `delete` (default: add)
    /// - `WORKERS`: number of workers (default: 4)
    /// - `CHANNEL_CAPACITY`: worker channel capacity (default: 1000)
    /// - `SOLR_BLOCK_COUNT`: documents per flush (default: 250)
    /// - `SOLR_BUFFER_SIZE_MB`: bytes per flush, in MiB, at most 1024 (default: 2)
    /// - `SOLR_FLUSH_TIME`: seconds before a partial batch is flushed (default: 30)
    /// - `SOLR_COMMIT_TIME`: seconds between commits, 0 disables (default: 180)
    /// - `SOLR_COMMIT_WITHIN_TIME`: commit-within hint in seconds, 0 disables (default: 0)
    /// - `SOLR_TIMEOUT`: request timeout in seconds (default: 30)
    /// - `SOLR_SUBDOC_DELIMITER`: sub-document id delimiter (default: unset)
    /// - `POLL_WAIT`: queue long-poll wait in seconds (default: 15)
    /// - `ACK_FAILURE_POLICY`: `abandon` or `requeue` (default: abandon)
    /// - `WORKER_RESTARTS`: worker restart budget, 0 fails fast (default: 0)
    pub fn from_env() -> Result<Self, PushError> {
        dotenv::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.log();
        Ok(config)
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PushError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let commit_within = secs(&lookup, "SOLR_COMMIT_WITHIN_TIME", DEFAULT_COMMIT_WITHIN_SECS)?;
        let operation = match string("SOLR_MODE", DEFAULT_SOLR_MODE).trim().to_ascii_lowercase().as_str() {
            "add" => BatchOperation::add_with_commit_within(commit_within),
            "delete" => BatchOperation::Delete,
            other => return Err(PushError::config(format!("SOLR_MODE must be add or delete, got {}", other))),
        };

        let ack_policy = AckFailurePolicy::from_str(&string("ACK_FAILURE_POLICY", DEFAULT_ACK_FAILURE_POLICY))
            .map_err(|e| PushError::config(e.to_string()))?;

        let workers = number(&lookup, "WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(PushError::config("WORKERS must be at least 1"));
        }

        let channel_capacity = number(&lookup, "CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?;
        if channel_capacity == 0 {
            return Err(PushError::config("CHANNEL_CAPACITY must be at least 1"));
        }

        let buffer_mb = number(&lookup, "SOLR_BUFFER_SIZE_MB", DEFAULT_BUFFER_SIZE_MB)?;
        if buffer_mb == 0 || buffer_mb > MAX_BUFFER_SIZE_MB {
            return Err(PushError::config(format!(
                "SOLR_BUFFER_SIZE_MB must be between 1 and {}, got {}",
                MAX_BUFFER_SIZE_MB, buffer_mb
            )));
        }

        Ok(Self {
            solr_url: string("SOLR_URL", DEFAULT_SOLR_URL),
            solr_core: string("SOLR_CORE", DEFAULT_SOLR_CORE),
            operation,
            workers,
            channel_capacity,
            block_count: number(&lookup, "SOLR_BLOCK_COUNT", DEFAULT_BLOCK_COUNT)?,
            buffer_bytes: buffer_mb * 1024 * 1024,
            flush_interval: secs(&lookup, "SOLR_FLUSH_TIME", DEFAULT_FLUSH_TIME_SECS)?,
            commit_interval: secs(&lookup, "SOLR_COMMIT_TIME", DEFAULT_COMMIT_TIME_SECS)?,
            request_timeout: secs(&lookup, "SOLR_TIMEOUT", DEFAULT_TIMEOUT_SECS)?,
            sub_document_delimiter: lookup("SOLR_SUBDOC_DELIMITER").filter(|d| !d.is_empty()),
            poll_wait: secs(&lookup, "POLL_WAIT", DEFAULT_POLL_WAIT_SECS)?,
            ack_policy,
            worker_restarts: number(&lookup, "WORKER_RESTARTS", DEFAULT_WORKER_RESTARTS)?,
        })
    }

    /// Connection settings for one Solr client.
    pub fn solr_config(&self) -> SolrConfig {
        SolrConfig::new(&self.solr_url, &self.solr_core).with_request_timeout(self.request_timeout)
    }

    /// Settings for the pipeline.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            channel_capacity: self.channel_capacity,
            receiver: ReceiverConfig {
                poll_wait: self.poll_wait,
                ..ReceiverConfig::default()
            },
            pool: PoolConfig {
                worker_count: self.workers,
                supervisor: SupervisorPolicy::from_restarts(self.worker_restarts),
            },
            worker: WorkerConfig {
                sub_document_delimiter: self.sub_document_delimiter.clone(),
                buffer: BufferConfig {
                    operation: self.operation,
                    block_count: self.block_count,
                    buffer_bytes: self.buffer_bytes,
                    flush_interval: self.flush_interval,
                    commit_interval: self.commit_interval,
                },
                ack_policy: self.ack_policy,
                ..WorkerConfig::default()
            },
        }
    }

    fn log(&self) {
        info!(
            solr_url = %self.solr_url,
            solr_core = %self.solr_core,
            operation = ?self.operation,
            workers = self.workers,
            channel_capacity = self.channel_capacity,
            block_count = self.block_count,
            buffer_bytes = self.buffer_bytes,
            flush_secs = self.flush_interval.as_secs(),
            commit_secs = self.commit_interval.as_secs(),
            timeout_secs = self.request_timeout.as_secs(),
            sub_document_delimiter = ?self.sub_document_delimiter,
            poll_wait_secs = self.poll_wait.as_secs(),
            ack_policy = ?self.ack_policy,
            worker_restarts = self.worker_restarts,
            "Loaded configuration"
        );
    }
}

fn number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PushError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PushError::config(format!("{} must be a non-negative integer, got {:?}", key, raw))),
    }
}

fn secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, PushError>
where
    F: Fn(&str) -> Option<String>,
{
    number(lookup, key, default).map(Duration::from_secs)
}
