//! Solr client implementation.
//!
//! Speaks the XML update handler protocol over HTTP and turns responses
//! into `FlushOutcome`s.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::SolrConfig;
use crate::errors::IndexError;
use crate::interfaces::IndexBackend;
use crate::solr::decoder::FailureDecoder;
use crate::solr::response::{parse_response, SolrResponse};
use crate::solr::retry::is_transient;
use crate::types::FlushOutcome;

const COMMIT_PAYLOAD: &[u8] = b"<commit/>";
const XML_CONTENT_TYPE: &str = "application/xml";

/// Solr client owned by a single worker.
///
/// # Example
///
/// ```ignore
/// let client = SolrClient::new(SolrConfig::new("http://localhost:8983/solr", "catalog"))?;
/// client.ping().await?;
/// let outcome = client.add(b"<add><doc>...</doc></add>").await?;
/// ```
pub struct SolrClient {
    http: Client,
    config: SolrConfig,
    update_url: Url,
    ping_url: Url,
    decoder: FailureDecoder,
}

/// Status and body of a completed HTTP exchange.
struct Reply {
    status: StatusCode,
    body: Vec<u8>,
}

impl SolrClient {
    /// Create a client for the configured core.
    ///
    /// # Returns
    ///
    /// * `Ok(SolrClient)` - A new client instance
    /// * `Err(IndexError)` - If the URLs are invalid or the HTTP client cannot be built
    pub fn new(config: SolrConfig) -> Result<Self, IndexError> {
        let update_url = config.update_url()?;
        let ping_url = config.ping_url()?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| IndexError::request(e.to_string()))?;

        debug!(update_url = %update_url, "Created Solr client");

        Ok(Self {
            http,
            config,
            update_url,
            ping_url,
            decoder: FailureDecoder::default(),
        })
    }

    /// Replace the failure decoder.
    pub fn with_decoder(mut self, decoder: FailureDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    async fn post(&self, payload: &[u8]) -> Result<Reply, IndexError> {
        self.send_with_retry("POST", || {
            self.http
                .post(self.update_url.clone())
                .header(CONTENT_TYPE, XML_CONTENT_TYPE)
                .body(payload.to_vec())
        })
        .await
    }

    /// Send a request, retrying transient transport failures with a fixed delay.
    async fn send_with_retry<F>(&self, method: &str, build: F) -> Result<Reply, IndexError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| IndexError::connection(format!("Reading {} response: {}", method, e)))?;
                    return Ok(Reply {
                        status,
                        body: body.to_vec(),
                    });
                }
                Err(e) => {
                    if !is_transient(&e) {
                        return Err(IndexError::connection(e.to_string()));
                    }
                    if attempt >= self.config.max_attempts {
                        error!(attempt = attempt, error = %e, "{} failed, giving up", method);
                        return Err(IndexError::connection(format!(
                            "{} failed after {} attempts: {}",
                            method, attempt, e
                        )));
                    }

                    warn!(
                        attempt = attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "{} failed, retrying",
                        method
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl IndexBackend for SolrClient {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn add(&self, payload: &[u8]) -> Result<FlushOutcome, IndexError> {
        let reply = self.post(payload).await?;
        let outcome = decode_update_reply(reply.status.as_u16(), &reply.body, &self.decoder)?;
        if outcome != FlushOutcome::Success {
            warn!(outcome = ?outcome, "Add reported a failure");
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn commit(&self) -> Result<(), IndexError> {
        let reply = self.post(COMMIT_PAYLOAD).await?;
        match decode_update_reply(reply.status.as_u16(), &reply.body, &self.decoder)? {
            FlushOutcome::Success => Ok(()),
            other => Err(IndexError::commit(format!(
                "Commit rejected ({:?}): {}",
                other,
                String::from_utf8_lossy(&reply.body)
            ))),
        }
    }

    async fn ping(&self) -> Result<(), IndexError> {
        let start = Instant::now();
        let reply = self
            .send_with_retry("GET", || self.http.get(self.ping_url.clone()))
            .await?;

        if !reply.status.is_success() {
            error!(status = %reply.status, "Ping failed");
            return Err(IndexError::http(
                reply.status.as_u16(),
                String::from_utf8_lossy(&reply.body),
            ));
        }

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            url = %self.ping_url,
            "Ping succeeded"
        );
        Ok(())
    }
}

/// Turn an update handler reply into an outcome.
///
/// * 2xx: the body must carry a status field, otherwise it is a protocol error.
/// * 4xx: decoded like 2xx when the body is a structured response; otherwise
///   a total failure with whatever marker the raw body yields.
/// * anything else: fatal.
pub(crate) fn decode_update_reply(
    status: u16,
    body: &[u8],
    decoder: &FailureDecoder,
) -> Result<FlushOutcome, IndexError> {
    match status {
        200..=299 => decode_status(parse_response(body)?, body, decoder),
        400..=499 => match parse_response(body) {
            Ok(response) if response.status.is_some() => decode_status(response, body, decoder),
            _ => {
                warn!(status = status, "Update rejected with an unstructured body");
                Ok(decoder.outcome_for_rejection(&String::from_utf8_lossy(body)))
            }
        },
        _ => {
            error!(status = status, "Update failed");
            Err(IndexError::http(status, String::from_utf8_lossy(body)))
        }
    }
}

fn decode_status(
    response: SolrResponse,
    body: &[u8],
    decoder: &FailureDecoder,
) -> Result<FlushOutcome, IndexError> {
    match response.status {
        None => Err(IndexError::protocol(format!(
            "Cannot find status field in response payload ({})",
            String::from_utf8_lossy(body)
        ))),
        Some(0) => Ok(FlushOutcome::Success),
        Some(code) => {
            debug!(status = code, "Response carries a failure status");
            Ok(decoder.outcome_for_error(response.error_message.as_deref()))
        }
    }
}
