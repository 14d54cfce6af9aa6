//! Acknowledgment module for the solr push pipeline.
//!
//! Deletes indexed messages from the queue in blocks no larger than the
//! transport accepts. Acknowledgment failures are never fatal: a message
//! that could not be deleted is redelivered later and indexed again.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use solr_push_shared::InboundMessage;

use crate::errors::PipelineError;
use crate::queue::QueueTransport;

/// What to do with messages whose delete failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckFailurePolicy {
    /// Log them and let the queue redeliver after its visibility timeout.
    #[default]
    Abandon,
    /// Resubmit them to the queue for immediate redelivery.
    Requeue,
}

impl FromStr for AckFailurePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abandon" => Ok(Self::Abandon),
            "requeue" => Ok(Self::Requeue),
            other => Err(PipelineError::config(format!(
                "Unknown acknowledgment failure policy: {}",
                other
            ))),
        }
    }
}

/// Counts from one `acknowledge_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckSummary {
    /// Delete calls made.
    pub blocks: usize,
    /// Messages deleted.
    pub deleted: usize,
    /// Messages whose delete failed.
    pub failed: usize,
    /// Failed messages resubmitted to the queue.
    pub requeued: usize,
}

/// Deletes processed messages from the queue.
pub struct Acknowledger {
    worker_id: usize,
    queue: Arc<dyn QueueTransport>,
    policy: AckFailurePolicy,
}

impl Acknowledger {
    /// Create an acknowledger for one worker.
    pub fn new(worker_id: usize, queue: Arc<dyn QueueTransport>, policy: AckFailurePolicy) -> Self {
        Self {
            worker_id,
            queue,
            policy,
        }
    }

    /// Delete every message, one block at a time.
    #[instrument(skip(self, messages), fields(worker_id = self.worker_id, count = messages.len()))]
    pub async fn acknowledge_all(&self, messages: &[InboundMessage]) -> AckSummary {
        let mut summary = AckSummary::default();
        if messages.is_empty() {
            return summary;
        }

        let start = Instant::now();
        let block_size = self.queue.max_block_count().max(1);

        for block in messages.chunks(block_size) {
            self.acknowledge_block(block, &mut summary).await;
        }

        info!(
            deleted = summary.deleted,
            failed = summary.failed,
            blocks = summary.blocks,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch delete completed"
        );
        summary
    }

    async fn acknowledge_block(&self, block: &[InboundMessage], summary: &mut AckSummary) {
        summary.blocks += 1;

        let statuses = match self.queue.batch_delete(block).await {
            Ok(statuses) => statuses,
            Err(e) => {
                error!(count = block.len(), error = %e, "Block delete failed");
                summary.failed += block.len();
                return;
            }
        };

        let failed: Vec<InboundMessage> = block
            .iter()
            .enumerate()
            .filter(|(ix, _)| !statuses.get(*ix).copied().unwrap_or(false))
            .map(|(_, message)| message.clone())
            .collect();

        summary.deleted += block.len() - failed.len();
        if failed.is_empty() {
            return;
        }

        summary.failed += failed.len();
        for message in &failed {
            error!(
                document_id = %message.document_id,
                delete_handle = %message.delete_handle,
                "Message failed to delete"
            );
        }

        if self.policy == AckFailurePolicy::Requeue {
            summary.requeued += self.requeue(&failed).await;
        }
    }

    async fn requeue(&self, failed: &[InboundMessage]) -> usize {
        match self.queue.batch_put(failed).await {
            Ok(statuses) => {
                let requeued = statuses.iter().filter(|ok| **ok).count();
                if requeued < failed.len() {
                    warn!(
                        requeued = requeued,
                        failed = failed.len() - requeued,
                        "Some messages could not be requeued"
                    );
                }
                requeued
            }
            Err(e) => {
                warn!(count = failed.len(), error = %e, "Requeue failed, relying on redelivery");
                0
            }
        }
    }
}
