//! Dependency initialization and wiring for the solr push service.

use std::sync::Arc;

use tracing::info;

use solr_push_pipeline::orchestrator::Orchestrator;
use solr_push_pipeline::pool::BackendFactory;
use solr_push_pipeline::queue::QueueTransport;
use solr_push_repository::{IndexBackend, SolrClient};

use crate::config::ServiceConfig;
use crate::PushError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`ServiceConfig::from_env`] for the variables read.
    pub fn from_env(queue: Arc<dyn QueueTransport>) -> Result<Self, PushError> {
        let config = ServiceConfig::from_env()?;
        Self::new(&config, queue)
    }

    /// Wire the pipeline for `config` on top of `queue`.
    ///
    /// The Solr endpoint is validated here, so a malformed URL fails before
    /// any worker starts. Reachability is checked by each worker's ping.
    pub fn new(config: &ServiceConfig, queue: Arc<dyn QueueTransport>) -> Result<Self, PushError> {
        let solr_config = config.solr_config();
        let update_url = solr_config.update_url()?;
        info!(update_url = %update_url, "Initializing dependencies");

        let factory: BackendFactory = Arc::new(move |worker_id| {
            let client = SolrClient::new(solr_config.clone())?;
            info!(worker_id = worker_id, "Solr client created");
            Ok(Arc::new(client) as Arc<dyn IndexBackend>)
        });

        let orchestrator =
            Orchestrator::with_config(queue, factory, config.orchestrator_config());

        Ok(Self { orchestrator })
    }

    /// Run the pipeline until shutdown or an unrecoverable failure.
    pub async fn run(&self) -> Result<(), PushError> {
        self.orchestrator.run().await?;
        Ok(())
    }
}
