//! Maps a flush outcome onto the messages that were in the batch.

use tracing::warn;

use solr_push_repository::{FailedDocument, FlushOutcome};
use solr_push_shared::InboundMessage;

/// Identifier the backend reports when it can only blame the first document.
pub const FIRST_POSITION_MARKER: &str = "1";

/// What to do with each message of a flushed batch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Indexed messages to delete from the queue.
    pub acknowledge: Vec<InboundMessage>,
    /// The rejected message. It is neither retried nor deleted.
    pub discarded: Option<InboundMessage>,
    /// Messages to buffer again and resend.
    pub retry: Vec<InboundMessage>,
    /// Messages given up on because no culprit could be identified.
    pub abandoned: Vec<InboundMessage>,
}

impl Recovery {
    /// Whether another flush is needed.
    pub fn needs_retry(&self) -> bool {
        !self.retry.is_empty()
    }
}

/// Split `queued` according to the outcome of flushing it.
pub fn plan_recovery(
    mut queued: Vec<InboundMessage>,
    outcome: &FlushOutcome,
    sub_document_delimiter: Option<&str>,
) -> Recovery {
    match outcome {
        FlushOutcome::Success => Recovery {
            acknowledge: queued,
            ..Recovery::default()
        },
        FlushOutcome::PartialFailure { position } => {
            let position = *position;
            if position >= queued.len() {
                warn!(
                    position = position,
                    count = queued.len(),
                    "Failure position outside the batch"
                );
                return abandon(queued);
            }
            let retry = queued.split_off(position + 1);
            let discarded = queued.pop();
            Recovery {
                acknowledge: queued,
                discarded,
                retry,
                abandoned: Vec::new(),
            }
        }
        FlushOutcome::TotalFailure { failed } => {
            let culprit = match failed {
                Some(FailedDocument::Identifier(id)) => {
                    culprit_by_id(&queued, id, sub_document_delimiter)
                }
                Some(FailedDocument::Position(p)) => (*p < queued.len()).then_some(*p),
                None => None,
            };

            match culprit {
                Some(ix) => {
                    let discarded = queued.remove(ix);
                    Recovery {
                        discarded: Some(discarded),
                        retry: queued,
                        ..Recovery::default()
                    }
                }
                None => abandon(queued),
            }
        }
    }
}

fn abandon(queued: Vec<InboundMessage>) -> Recovery {
    Recovery {
        abandoned: queued,
        ..Recovery::default()
    }
}

fn culprit_by_id(
    queued: &[InboundMessage],
    reported_id: &str,
    sub_document_delimiter: Option<&str>,
) -> Option<usize> {
    let id = parent_id(reported_id, sub_document_delimiter);
    queued
        .iter()
        .position(|message| message.document_id == id)
        .or_else(|| (reported_id == FIRST_POSITION_MARKER && !queued.is_empty()).then_some(0))
}

/// Strip a sub-document suffix from a reported identifier.
pub fn parent_id<'a>(id: &'a str, sub_document_delimiter: Option<&str>) -> &'a str {
    match sub_document_delimiter {
        Some(delimiter) if !delimiter.is_empty() => {
            id.split_once(delimiter).map_or(id, |(parent, _)| parent)
        }
        _ => id,
    }
}
