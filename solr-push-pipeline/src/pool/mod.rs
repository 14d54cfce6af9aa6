//! Worker pool module for the solr push pipeline.
//!
//! Runs a fixed number of workers over the shared channel and decides
//! what happens when one of them fails.

use std::sync::Arc;

use async_channel::Receiver;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use solr_push_repository::{IndexBackend, IndexError};
use solr_push_shared::InboundMessage;

use crate::errors::PipelineError;
use crate::queue::QueueTransport;
use crate::worker::{Worker, WorkerConfig};

/// Builds the index backend for the worker with the given id.
pub type BackendFactory =
    Arc<dyn Fn(usize) -> Result<Arc<dyn IndexBackend>, IndexError> + Send + Sync>;

/// What the pool does when a worker stops with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorPolicy {
    /// Stop the pool and report the failure.
    #[default]
    FailFast,
    /// Replace the worker with a fresh one, at most `max_restarts` times in total.
    Restart { max_restarts: usize },
}

impl SupervisorPolicy {
    /// Policy for a restart budget, where zero means fail fast.
    pub fn from_restarts(max_restarts: usize) -> Self {
        if max_restarts == 0 {
            Self::FailFast
        } else {
            Self::Restart { max_restarts }
        }
    }

    fn allows_restart(&self, restarts_so_far: usize) -> bool {
        match self {
            Self::FailFast => false,
            Self::Restart { max_restarts } => restarts_so_far < *max_restarts,
        }
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,
    /// What to do when a worker fails.
    pub supervisor: SupervisorPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            supervisor: SupervisorPolicy::default(),
        }
    }
}

type WorkerResult = (usize, Result<(), PipelineError>);

/// Supervises the workers reading from one channel.
pub struct WorkerPool {
    config: PoolConfig,
    worker_config: WorkerConfig,
    factory: BackendFactory,
    queue: Arc<dyn QueueTransport>,
    inbound: Receiver<InboundMessage>,
}

impl WorkerPool {
    /// Create a pool whose workers read from `inbound`.
    pub fn new(
        config: PoolConfig,
        worker_config: WorkerConfig,
        factory: BackendFactory,
        queue: Arc<dyn QueueTransport>,
        inbound: Receiver<InboundMessage>,
    ) -> Self {
        Self {
            config,
            worker_config,
            factory,
            queue,
            inbound,
        }
    }

    /// Run every worker to completion.
    ///
    /// Returns once all workers have drained the closed channel, or as soon
    /// as a worker failure is not absorbed by the supervisor policy. The
    /// remaining workers are aborted in that case.
    #[instrument(skip(self), fields(worker_count = self.config.worker_count))]
    pub async fn run(self) -> Result<(), PipelineError> {
        if self.config.worker_count == 0 {
            return Err(PipelineError::config("worker count must be at least 1"));
        }

        info!(supervisor = ?self.config.supervisor, "Starting worker pool");

        let mut workers = JoinSet::new();
        for id in 0..self.config.worker_count {
            self.spawn_worker(&mut workers, id)?;
        }

        let mut restarts = 0;
        while let Some(joined) = workers.join_next().await {
            let (worker_id, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    error!(error = %e, "Worker task aborted");
                    workers.abort_all();
                    return Err(PipelineError::task(e.to_string()));
                }
            };

            let e = match result {
                Ok(()) => {
                    info!(worker_id = worker_id, "Worker finished");
                    continue;
                }
                Err(e) => e,
            };

            error!(worker_id = worker_id, error = %e, "Worker failed");
            if !self.config.supervisor.allows_restart(restarts) {
                workers.abort_all();
                return Err(PipelineError::worker_failed(worker_id, e));
            }

            restarts += 1;
            warn!(worker_id = worker_id, restarts = restarts, "Restarting worker");
            self.spawn_worker(&mut workers, worker_id)?;
        }

        info!("All workers finished");
        Ok(())
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<WorkerResult>,
        id: usize,
    ) -> Result<(), PipelineError> {
        let backend = (self.factory)(id)?;
        let worker = Worker::new(
            id,
            self.worker_config.clone(),
            backend,
            self.queue.clone(),
            self.inbound.clone(),
        );
        workers.spawn(async move { (id, worker.run().await) });
        Ok(())
    }
}
