//! Request and outcome types for index backend operations.

use std::time::Duration;

/// The kind of update a batch carries.
///
/// The commit-within hint only exists for additions; the backend has no use
/// for it on a delete batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    /// Add (or replace) documents.
    Add {
        /// Ask the backend to commit within this long after the add.
        commit_within: Option<Duration>,
    },
    /// Delete documents.
    Delete,
}

impl BatchOperation {
    /// An add batch without a commit-within hint.
    pub fn add() -> Self {
        Self::Add {
            commit_within: None,
        }
    }

    /// An add batch with a commit-within hint. A zero duration disables the hint.
    pub fn add_with_commit_within(commit_within: Duration) -> Self {
        Self::Add {
            commit_within: (!commit_within.is_zero()).then_some(commit_within),
        }
    }

    /// Element name of the batch wrapper.
    pub fn element(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Delete => "delete",
        }
    }

    /// Opening tag of the batch wrapper.
    pub fn open_tag(&self) -> String {
        match self {
            Self::Add {
                commit_within: Some(within),
            } => format!("<add commitWithin=\"{}\">", within.as_millis()),
            _ => format!("<{}>", self.element()),
        }
    }

    /// Closing tag of the batch wrapper.
    pub fn close_tag(&self) -> String {
        format!("</{}>", self.element())
    }
}

impl Default for BatchOperation {
    fn default() -> Self {
        Self::add()
    }
}

/// A document named by a failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedDocument {
    /// Zero-based position of the document within the submitted batch.
    Position(usize),
    /// Identifier of the document as reported by the backend.
    Identifier(String),
}

/// Result of submitting one batch to the index backend.
///
/// Unrecoverable conditions are not an outcome; they are returned as
/// `Err(IndexError)` by the backend instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every document in the batch was accepted.
    Success,
    /// Documents before `position` were accepted, the one at `position` was
    /// rejected and the rest were not processed.
    PartialFailure {
        /// Zero-based position of the rejected document.
        position: usize,
    },
    /// The whole batch was rejected, typically because of one bad document.
    TotalFailure {
        /// The culprit, when the backend named one.
        failed: Option<FailedDocument>,
    },
}

impl FlushOutcome {
    /// Whether any document reached the index.
    pub fn added_documents(&self) -> bool {
        matches!(self, Self::Success | Self::PartialFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_tags() {
        let op = BatchOperation::add();
        assert_eq!(op.open_tag(), "<add>");
        assert_eq!(op.close_tag(), "</add>");
    }

    #[test]
    fn test_commit_within_is_milliseconds() {
        let op = BatchOperation::add_with_commit_within(Duration::from_secs(5));
        assert_eq!(op.open_tag(), "<add commitWithin=\"5000\">");
    }

    #[test]
    fn test_zero_commit_within_disables_hint() {
        let op = BatchOperation::add_with_commit_within(Duration::ZERO);
        assert_eq!(op, BatchOperation::add());
    }

    #[test]
    fn test_delete_tags() {
        let op = BatchOperation::Delete;
        assert_eq!(op.open_tag(), "<delete>");
        assert_eq!(op.close_tag(), "</delete>");
    }

    #[test]
    fn test_added_documents() {
        assert!(FlushOutcome::Success.added_documents());
        assert!(FlushOutcome::PartialFailure { position: 2 }.added_documents());
        assert!(!FlushOutcome::TotalFailure { failed: None }.added_documents());
    }
}
