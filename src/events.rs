//! Observable conditions raised by the index.
//!
//! The core never prints. It reports build progress, skipped listing lines,
//! fallback lookups and ambiguous matches to an [`EventSink`]; hosts decide
//! whether that becomes log lines, a progress bar, or test assertions.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::index::{IndexEntry, LineError};

/// Something worth reporting that is not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    BuildStarted,
    /// Emitted every [`PROGRESS_INTERVAL`] listing lines unless the store
    /// was given another interval
    BuildProgress { lines: u64, inserted: u64 },
    /// A listing line was skipped
    MalformedLine(LineError),
    BuildFinished { inserted: u64, skipped: u64 },
    /// Exact lookup missed; retrying with a pattern match
    FallbackLookup { title: String },
    /// The pattern match hit several rows and `chosen` was used
    AmbiguousMatch {
        title: String,
        candidates: usize,
        chosen: IndexEntry,
    },
    /// A derived fact was recorded for an identifier the index does not know
    UnknownArticle { article_id: u64 },
}

/// Default number of listing lines between two [`IndexEvent::BuildProgress`] events.
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// Receiver for [`IndexEvent`]s
pub trait EventSink: Send + Sync {
    fn emit(&self, event: IndexEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: IndexEvent) {
        match event {
            IndexEvent::BuildStarted => info!("building seek index"),
            IndexEvent::BuildProgress { lines, inserted } => {
                info!(lines, inserted, "seek index build progress")
            }
            IndexEvent::MalformedLine(err) => {
                warn!(line_no = err.line_no, reason = %err.fault, "couldn't parse line: '{}'", err.line)
            }
            IndexEvent::BuildFinished { inserted, skipped } => {
                info!(inserted, skipped, "seek index built")
            }
            IndexEvent::FallbackLookup { title } => {
                debug!("falling back to LIKE for '{}'", title)
            }
            IndexEvent::AmbiguousMatch {
                title,
                candidates,
                chosen,
            } => warn!(
                candidates,
                chosen_id = chosen.article_id,
                "'{}' matched several titles, using '{}'",
                title,
                chosen.title
            ),
            IndexEvent::UnknownArticle { article_id } => {
                warn!(article_id, "recording fact for an article not in the index")
            }
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<IndexEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<IndexEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&IndexEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| pred(ev)).count())
            .unwrap_or(0)
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: IndexEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
