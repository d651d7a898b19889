use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use super::{FactStore, SeekIndex};
use crate::error::{Error, Result};
use crate::events::{EventSink, IndexEvent, PROGRESS_INTERVAL, TracingSink};

pub(crate) const TITLE_INDEX: &str = "page_seeks_title_idx";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS page_seeks (
        article_id INTEGER NOT NULL UNIQUE,
        title TEXT NOT NULL,
        seek_index INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS page_seeks_title_idx ON page_seeks (title);
    CREATE TABLE IF NOT EXISTS derived_facts (
        article_id INTEGER NOT NULL,
        payload TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS derived_facts_article_idx ON derived_facts (article_id);
";

/// Storage handle shared by [`SeekIndex`] and [`FactStore`].
///
/// Every statement runs under one lock, which gives derived-fact appends a
/// single writer even when locator sessions run on several threads. Events
/// are only emitted once that lock is released, so a sink may query the
/// store.
pub struct IndexStore {
    conn: Mutex<Connection>,
    sink: Arc<dyn EventSink>,
    progress_interval: u64,
}

impl IndexStore {
    /// Open (or create) an index database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened index database");
        Self::from_connection(conn)
    }

    /// Index that lives only as long as this handle; see [`persist_to`](Self::persist_to).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            sink: Arc::new(TracingSink),
            progress_interval: PROGRESS_INTERVAL,
        })
    }

    /// Route index events to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Listing lines between two [`IndexEvent::BuildProgress`] events.
    pub fn with_progress_interval(mut self, lines: u64) -> Self {
        self.progress_interval = lines.max(1);
        self
    }

    pub(crate) fn progress_interval(&self) -> u64 {
        self.progress_interval
    }

    pub fn seek_index(&self) -> SeekIndex<'_> {
        SeekIndex::new(self)
    }

    pub fn facts(&self) -> FactStore<'_> {
        FactStore::new(self)
    }

    /// Write the whole database to a new file at `path`.
    ///
    /// Refuses to overwrite an existing file. Reopening the file with
    /// [`open`](Self::open) gives the same lookup results.
    pub fn persist_to(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(Error::Io(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )));
        }
        let target = path.to_str().ok_or_else(|| {
            Error::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not valid UTF-8", path.display()),
            ))
        })?;

        self.with_conn(|conn| {
            conn.execute("VACUUM INTO ?1", [target])?;
            Ok(())
        })?;
        info!(path = %path.display(), "persisted index database");
        Ok(())
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| Error::StoragePoisoned)?;
        f(&mut *conn)
    }

    pub(crate) fn emit(&self, event: IndexEvent) {
        self.sink.emit(event);
    }
}

/// Convert an identifier or offset to SQLite's signed INTEGER.
pub(crate) fn sql_int(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|e| Error::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}
