//! Inbound message type.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Message attribute carrying the application-assigned document identifier.
pub const RECORD_ID_ATTRIBUTE: &str = "id";

/// Identifier used when a message carries no document identifier.
pub const UNKNOWN_DOCUMENT_ID: &str = "unknown";

/// A message received from the work queue.
///
/// The delete handle identifies one *delivery* of a message, not the
/// document: the same document redelivered arrives with a new handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Raw document payload, appended verbatim to the index batch.
    pub payload: Vec<u8>,
    /// Queue-specific handle used to delete this delivery.
    pub delete_handle: String,
    /// Message attributes as delivered by the queue.
    pub attributes: HashMap<String, String>,
    /// Document identifier taken from the `id` attribute.
    pub document_id: String,
    /// When the receive loop took the message off the queue.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create a message, extracting the document identifier from its attributes.
    pub fn new(
        payload: impl Into<Vec<u8>>,
        delete_handle: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> Self {
        let delete_handle = delete_handle.into();
        let document_id = match attributes.get(RECORD_ID_ATTRIBUTE) {
            Some(id) => id.clone(),
            None => {
                warn!(delete_handle = %delete_handle, "Cannot locate document id, using default");
                UNKNOWN_DOCUMENT_ID.to_string()
            }
        };

        Self {
            payload: payload.into(),
            delete_handle,
            attributes,
            document_id,
            received_at: Utc::now(),
        }
    }

    /// Create a message whose only attribute is the document identifier.
    pub fn with_id(
        document_id: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        delete_handle: impl Into<String>,
    ) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(RECORD_ID_ATTRIBUTE.to_string(), document_id.into());
        Self::new(payload, delete_handle, attributes)
    }

    /// Size of the payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
