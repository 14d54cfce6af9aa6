//! Orchestrator module for the solr push pipeline.
//!
//! Wires the queue receiver to the worker pool and handles shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, instrument};

use solr_push_shared::InboundMessage;

use crate::errors::PipelineError;
use crate::pool::{BackendFactory, PoolConfig, WorkerPool};
use crate::queue::{shutdown_requested, QueueReceiver, QueueTransport, ReceiverConfig};
use crate::worker::WorkerConfig;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Capacity of the channel between the receiver and the workers.
    pub channel_capacity: usize,
    /// Queue polling settings.
    pub receiver: ReceiverConfig,
    /// Worker count and supervisor policy.
    pub pool: PoolConfig,
    /// Settings shared by every worker.
    pub worker: WorkerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            receiver: ReceiverConfig::default(),
            pool: PoolConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Orchestrator that coordinates the pipeline components.
///
/// The orchestrator:
/// - Starts the queue receiver and the worker pool
/// - Closes the worker channel on Ctrl-C or `shutdown()`
/// - Waits for the workers to drain
///
/// A `shutdown()` issued before `run()` makes `run()` stop as soon as it
/// has started.
pub struct Orchestrator {
    queue: Arc<dyn QueueTransport>,
    factory: BackendFactory,
    config: OrchestratorConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl Orchestrator {
    /// Create a new orchestrator with the default configuration.
    pub fn new(queue: Arc<dyn QueueTransport>, factory: BackendFactory) -> Self {
        Self::with_config(queue, factory, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        queue: Arc<dyn QueueTransport>,
        factory: BackendFactory,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            queue,
            factory,
            config,
            shutdown_tx,
        }
    }

    /// Run the pipeline.
    ///
    /// Blocks until a shutdown signal has been handled and the workers have
    /// drained, or until the pool stops on a worker failure.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        info!(
            channel_capacity = self.config.channel_capacity,
            workers = self.config.pool.worker_count,
            "Starting solr push orchestrator"
        );

        let (tx, rx) = async_channel::bounded::<InboundMessage>(self.config.channel_capacity);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let receiver = QueueReceiver::new(self.queue.clone(), tx, self.config.receiver.clone());
        let receiver_handle = tokio::spawn(receiver.run(self.shutdown_tx.subscribe()));

        let pool = WorkerPool::new(
            self.config.pool.clone(),
            self.config.worker.clone(),
            self.factory.clone(),
            self.queue.clone(),
            rx,
        );
        let mut pool_handle = tokio::spawn(pool.run());

        let pool_result = tokio::select! {
            joined = &mut pool_handle => flatten(joined),
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                self.shutdown_tx.send_replace(true);
                flatten(pool_handle.await)
            }
            _ = shutdown_requested(&mut shutdown_rx) => {
                info!("Shutdown requested");
                flatten(pool_handle.await)
            }
        };

        // The pool may have stopped on its own; the receiver still has to go.
        self.shutdown_tx.send_replace(true);
        let receiver_result = flatten(receiver_handle.await);

        match (pool_result, receiver_result) {
            (Err(e), _) => {
                error!(error = %e, "Worker pool failed");
                Err(e)
            }
            (Ok(()), Err(e)) => {
                error!(error = %e, "Queue receiver failed");
                Err(e)
            }
            (Ok(()), Ok(())) => {
                info!("Orchestrator shutdown complete");
                Ok(())
            }
        }
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

fn flatten(joined: Result<Result<(), PipelineError>, JoinError>) -> Result<(), PipelineError> {
    joined.map_err(|e| PipelineError::task(e.to_string()))?
}
