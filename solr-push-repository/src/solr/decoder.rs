//! Failure decoder.
//!
//! Solr reports which document broke a batch only inside its free-text
//! error message. Matchers are tried in order; a message no matcher
//! recognises is reported as an unattributed total failure.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::types::{FailedDocument, FlushOutcome};

/// `[<document number>,<line>]`, document number one-based.
static POSITION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+),\d+\]").expect("position marker regex"));

/// `[doc=<identifier>]`
static DOCUMENT_ID_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[doc=([^\]]+)\]").expect("document id marker regex"));

/// Recognises one shape of failure report.
pub trait FailureMatcher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract the failed document from an error message, if this shape matches.
    fn match_message(&self, message: &str) -> Option<FailedDocument>;
}

/// Matches the `[N,M]` position marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionMarkerMatcher;

impl FailureMatcher for PositionMarkerMatcher {
    fn name(&self) -> &'static str {
        "position"
    }

    fn match_message(&self, message: &str) -> Option<FailedDocument> {
        let captures = POSITION_MARKER.captures(message)?;
        let number: usize = captures.get(1)?.as_str().parse().ok()?;
        number.checked_sub(1).map(FailedDocument::Position)
    }
}

/// Matches the `[doc=<id>]` identifier marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentIdMatcher;

impl FailureMatcher for DocumentIdMatcher {
    fn name(&self) -> &'static str {
        "document-id"
    }

    fn match_message(&self, message: &str) -> Option<FailedDocument> {
        let captures = DOCUMENT_ID_MARKER.captures(message)?;
        let id = captures.get(1)?.as_str().trim();
        (!id.is_empty()).then(|| FailedDocument::Identifier(id.to_string()))
    }
}

/// Ordered table of failure matchers; the first match wins.
pub struct FailureDecoder {
    matchers: Vec<Box<dyn FailureMatcher>>,
}

impl Default for FailureDecoder {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PositionMarkerMatcher),
            Box::new(DocumentIdMatcher),
        ])
    }
}

impl std::fmt::Debug for FailureDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.matchers.iter().map(|m| m.name()).collect();
        f.debug_struct("FailureDecoder").field("matchers", &names).finish()
    }
}

impl FailureDecoder {
    /// Create a decoder from an explicit matcher table.
    pub fn new(matchers: Vec<Box<dyn FailureMatcher>>) -> Self {
        Self { matchers }
    }

    /// Append a matcher to the end of the table.
    pub fn with_matcher(mut self, matcher: Box<dyn FailureMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Find the failed document named by `message`.
    pub fn find(&self, message: &str) -> Option<FailedDocument> {
        self.matchers
            .iter()
            .find_map(|matcher| matcher.match_message(message))
    }

    /// Outcome for a structured response that carried a non-zero status.
    ///
    /// A position marker means the documents before it were indexed; an
    /// identifier marker means the whole batch was rejected.
    pub fn outcome_for_error(&self, message: Option<&str>) -> FlushOutcome {
        let Some(message) = message else {
            warn!("Failure reported without an error message");
            return FlushOutcome::TotalFailure { failed: None };
        };

        match self.find(message) {
            Some(FailedDocument::Position(position)) => FlushOutcome::PartialFailure { position },
            Some(failed @ FailedDocument::Identifier(_)) => FlushOutcome::TotalFailure {
                failed: Some(failed),
            },
            None => {
                warn!(message = %message, "Unrecognized failure report");
                FlushOutcome::TotalFailure { failed: None }
            }
        }
    }

    /// Outcome for a client-error response whose body could not be parsed.
    ///
    /// Nothing is known to have been indexed, so any marker only names the
    /// culprit of a total failure.
    pub fn outcome_for_rejection(&self, body: &str) -> FlushOutcome {
        let failed = self.find(body);
        if failed.is_none() {
            warn!(body = %body, "Unrecognized rejection");
        }
        FlushOutcome::TotalFailure { failed }
    }
}
