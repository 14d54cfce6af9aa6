//! Solr implementation of the index backend.

mod client;
mod decoder;
mod response;
mod retry;

pub use client::SolrClient;
pub use decoder::{DocumentIdMatcher, FailureDecoder, FailureMatcher, PositionMarkerMatcher};
pub use response::{parse_response, SolrResponse};
