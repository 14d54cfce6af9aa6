//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solr_push_repository::{FlushOutcome, IndexBackend, IndexError};

/// Index backend that records payloads and replays scripted outcomes.
///
/// Once the script runs out every add succeeds.
#[derive(Default)]
pub(crate) struct MockBackend {
    outcomes: Mutex<VecDeque<Result<FlushOutcome, IndexError>>>,
    payloads: Mutex<Vec<String>>,
    commits: AtomicUsize,
    pings: AtomicUsize,
    fail_commits: AtomicBool,
    fail_ping: AtomicBool,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_outcome(&self, outcome: Result<FlushOutcome, IndexError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_ping(&self) {
        self.fail_ping.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl IndexBackend for MockBackend {
    async fn add(&self, payload: &[u8]) -> Result<FlushOutcome, IndexError> {
        self.payloads
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(payload).into_owned());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(FlushOutcome::Success))
    }

    async fn commit(&self) -> Result<(), IndexError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(IndexError::commit("scripted commit failure"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), IndexError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(IndexError::connection("scripted ping failure"));
        }
        Ok(())
    }
}
