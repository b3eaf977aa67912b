//! Capture pipeline.
//!
//! A [`CaptureSession`] lives with the observed page: it classifies calls,
//! keeps its own per-page cache for inspection, and posts every capture as a
//! [`CaptureMessage`] on a channel. The [`HistoryOwner`] on the other end is
//! the only writer of the stored history and its checklist projection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::checklist;
use super::classifier::{Classification, Classifier};
use super::error::{Error, Result};
use super::history::{self, History, MergeHint};
use super::settings::keys;
use super::store::{Store, StoreExt};
use super::types::*;

const DEFAULT_MAX_RETRIES: usize = 8;

/// A capture travelling from the session to the history owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMessage {
    record: CapturedRequest,
    hint: MergeHint,
}

impl CaptureMessage {
    /// The hint is always derived from the record's category.
    pub fn new(record: CapturedRequest, history_limit: usize) -> Self {
        let hint = MergeHint::for_category(record.category, history_limit);
        Self { record, hint }
    }

    pub fn record(&self) -> &CapturedRequest {
        &self.record
    }

    pub fn hint(&self) -> MergeHint {
        self.hint
    }
}

pub fn channel() -> (
    mpsc::UnboundedSender<CaptureMessage>,
    mpsc::UnboundedReceiver<CaptureMessage>,
) {
    mpsc::unbounded_channel()
}

/// Per-page capture context.
pub struct CaptureSession {
    classifier: Arc<Classifier>,
    page: PageContext,
    cache: History,
    outbox: mpsc::UnboundedSender<CaptureMessage>,
}

impl CaptureSession {
    pub fn new(
        classifier: Arc<Classifier>,
        page: PageContext,
        outbox: mpsc::UnboundedSender<CaptureMessage>,
    ) -> Self {
        Self {
            classifier,
            page,
            cache: History::new(),
            outbox,
        }
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn observe(&mut self, call: &ObservedCall) -> Result<Classification> {
        self.observe_at(call, Utc::now())
    }

    /// Handle one call from the network hook. Only POST calls with a text
    /// body reach the classifier.
    pub fn observe_at(
        &mut self,
        call: &ObservedCall,
        captured_at: DateTime<Utc>,
    ) -> Result<Classification> {
        if !call.is_capturable() {
            debug!(url = %call.url, method = ?call.method, "not a POST with text body, skipping");
            return Ok(Classification::OutOfScope);
        }

        let classification = self.classifier.classify(&self.page, call, captured_at);
        if let Some(record) = classification.captured() {
            let limit = self.classifier.rules().history_limit;
            self.cache = history::merge_with_limit(&self.cache, &classification, limit);
            self.outbox
                .send(CaptureMessage::new(record.clone(), limit))
                .map_err(|_| Error::ChannelClosed)?;
        }
        Ok(classification)
    }

    /// Captures seen by this session, most recent first.
    pub fn requests(&self) -> &[CapturedRequest] {
        &self.cache
    }

    pub fn clear_requests(&mut self) {
        self.cache.clear();
    }
}

/// Result of folding one capture into the stored history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub record: CapturedRequest,
    pub previous: History,
    pub history: History,
    pub checklist: ChecklistState,
}

/// Sole writer of the stored history.
///
/// Every write is a compare-and-swap against the version read; on conflict
/// the owner re-reads and merges again.
pub struct HistoryOwner<S: Store + ?Sized> {
    store: Arc<S>,
    max_retries: usize,
}

impl<S: Store + ?Sized> HistoryOwner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Write the checklist projection if none is stored yet.
    pub fn initialize(&self) -> Result<ChecklistState> {
        if let Some((state, _)) = self.store.get_as::<ChecklistState>(keys::CHECKLIST)? {
            return Ok(state);
        }
        let state = checklist::project(&self.history()?);
        self.store.put(keys::CHECKLIST, &state)?;
        Ok(state)
    }

    pub fn history(&self) -> Result<History> {
        Ok(self.read()?.0)
    }

    /// Checklist recomputed from the stored history.
    pub fn checklist(&self) -> Result<ChecklistState> {
        Ok(checklist::project(&self.history()?))
    }

    fn read(&self) -> Result<(History, Option<u64>)> {
        Ok(match self.store.get_as::<History>(keys::HISTORY)? {
            Some((history, version)) => (history, Some(version)),
            None => (History::new(), None),
        })
    }

    pub fn apply(&self, message: CaptureMessage) -> Result<Applied> {
        let CaptureMessage { record, hint } = message;
        let mut last_version = None;

        for attempt in 0..=self.max_retries {
            let (previous, version) = self.read()?;
            last_version = version;
            let merged = history::apply(&previous, record.clone(), hint);

            match self.store.compare_and_swap(
                keys::HISTORY,
                version,
                serde_json::to_value(&merged)?,
            ) {
                Ok(_) => {
                    let checklist = self.write_checklist(&merged)?;
                    info!(
                        category = %record.category,
                        total = merged.len(),
                        replace_all = hint.is_replace_all(),
                        "history updated"
                    );
                    return Ok(Applied {
                        record,
                        previous,
                        history: merged,
                        checklist,
                    });
                }
                Err(Error::Conflict { .. }) => {
                    debug!(attempt, "history changed concurrently, merging again");
                }
                Err(e) => {
                    warn!(error = %e, "failed to write history");
                    return Err(e);
                }
            }
        }

        Err(Error::Conflict {
            key: keys::HISTORY.to_string(),
            expected: last_version,
        })
    }

    /// Empty the history; the checklist goes back to all-false.
    pub fn clear(&self) -> Result<ChecklistState> {
        self.store.put(keys::HISTORY, &History::new())?;
        self.write_checklist(&[])
    }

    fn write_checklist(&self, history: &[CapturedRequest]) -> Result<ChecklistState> {
        let state = checklist::project(history);
        self.store.put(keys::CHECKLIST, &state)?;
        Ok(state)
    }

    /// Apply messages until every sender is dropped. Failed writes are logged
    /// and skipped; the rest of the queue is still applied.
    pub async fn run<F>(
        &self,
        mut inbox: mpsc::UnboundedReceiver<CaptureMessage>,
        mut on_applied: F,
    ) -> usize
    where
        F: FnMut(Applied),
    {
        let mut applied = 0;
        while let Some(message) = inbox.recv().await {
            match self.apply(message) {
                Ok(outcome) => {
                    applied += 1;
                    on_applied(outcome);
                }
                Err(e) => warn!(error = %e, "dropping capture"),
            }
        }
        applied
    }
}
