//! # Solr Push Shared
//!
//! Types shared by every crate of the solr push pipeline. The inbound
//! message is the unit of work that flows from the queue, through the
//! workers, and back to the queue as an acknowledgment.

mod message;

pub use message::{InboundMessage, RECORD_ID_ATTRIBUTE, UNKNOWN_DOCUMENT_ID};
