//! Title → offset lookups over the `page_seeks` table.
//!
//! ## Lookup Policy
//!
//! Titles are stored exactly as the listing spells them. A lookup first tries
//! an exact `=` match and only then falls back to `LIKE` with the requested
//! title as the pattern, which is case-insensitive for ASCII and treats `%`
//! and `_` as wildcards. When the fallback hits several rows the earliest
//! inserted one wins and an [`IndexEvent::AmbiguousMatch`] is raised.
//!
//! Downstream facts are keyed by whatever entry this policy returns, so the
//! titles are deliberately never normalized.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use rusqlite::{ErrorCode, OptionalExtension, Row, params};

use super::listing::{self, LineError, LineFault};
use super::store::{IndexStore, TITLE_INDEX, sql_int};
use super::IndexEntry;
use crate::error::{Error, Result};
use crate::events::IndexEvent;

const SELECT_EXACT: &str =
    "SELECT article_id, title, seek_index FROM page_seeks WHERE title = ?1 ORDER BY rowid LIMIT 1";
const SELECT_LIKE: &str =
    "SELECT article_id, title, seek_index FROM page_seeks WHERE title LIKE ?1 ORDER BY rowid";
const SELECT_BY_ID: &str =
    "SELECT article_id, title, seek_index FROM page_seeks WHERE article_id = ?1";
const INSERT: &str = "INSERT INTO page_seeks (article_id, title, seek_index) VALUES (?1, ?2, ?3)";

/// Outcome of [`SeekIndex::build`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub inserted: u64,
    /// Every line that was skipped, in listing order
    pub skipped: Vec<LineError>,
}

/// Read-mostly view of the seek table
#[derive(Clone, Copy)]
pub struct SeekIndex<'s> {
    store: &'s IndexStore,
}

impl<'s> SeekIndex<'s> {
    pub(crate) fn new(store: &'s IndexStore) -> Self {
        Self { store }
    }

    /// Populate the index from an offset listing.
    ///
    /// The whole build runs in one transaction: an I/O failure part way leaves
    /// the table empty. Malformed lines and repeated identifiers are skipped
    /// and listed in the report.
    ///
    /// Events raised while the transaction is open are queued and delivered
    /// after the storage lock is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyPopulated`] if the table already has rows.
    pub fn build<B: BufRead>(&self, listing: B) -> Result<BuildReport> {
        let store = self.store;
        let rows = self.len()?;
        if rows > 0 {
            return Err(Error::AlreadyPopulated { rows });
        }
        store.emit(IndexEvent::BuildStarted);

        let interval = store.progress_interval();
        let mut events = Vec::new();
        let report = store.with_conn(|conn| {
            let rows = count_rows(conn)?;
            if rows > 0 {
                return Err(Error::AlreadyPopulated { rows });
            }

            let tx = conn.transaction()?;
            // Bulk insert first, index afterwards
            tx.execute_batch(&format!("DROP INDEX IF EXISTS {TITLE_INDEX}"))?;

            let mut report = BuildReport::default();
            {
                let mut insert = tx.prepare(INSERT)?;
                let mut records = listing::records(listing);
                while let Some(item) = records.next() {
                    let skipped = match item? {
                        Ok(entry) => insert_entry(&mut insert, &entry, records.lines_read())?,
                        Err(err) => Some(err),
                    };
                    match skipped {
                        Some(err) => {
                            events.push(IndexEvent::MalformedLine(err.clone()));
                            report.skipped.push(err);
                        }
                        None => report.inserted += 1,
                    }

                    let lines = records.lines_read();
                    if lines % interval == 0 {
                        events.push(IndexEvent::BuildProgress {
                            lines,
                            inserted: report.inserted,
                        });
                    }
                }
            }

            tx.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {TITLE_INDEX} ON page_seeks (title)"
            ))?;
            tx.commit()?;
            Ok(report)
        });

        for event in events {
            store.emit(event);
        }
        let report = report?;
        store.emit(IndexEvent::BuildFinished {
            inserted: report.inserted,
            skipped: report.skipped.len() as u64,
        });
        Ok(report)
    }

    /// Build from a listing file; `*.bz2` listings are decompressed on the fly.
    pub fn build_from_path(&self, path: &Path) -> Result<BuildReport> {
        let file = File::open(path)?;
        if path.extension().is_some_and(|ext| ext == "bz2") {
            self.build(BufReader::new(MultiBzDecoder::new(file)))
        } else {
            self.build(BufReader::new(file))
        }
    }

    /// Resolve a title to its entry.
    ///
    /// Exact match first, then a `LIKE` fallback. `Ok(None)` means the title
    /// is simply not indexed.
    pub fn find(&self, title: &str) -> Result<Option<IndexEntry>> {
        let exact = self.store.with_conn(|conn| {
            Ok(conn
                .query_row(SELECT_EXACT, [title], entry_from_row)
                .optional()?)
        })?;
        if exact.is_some() {
            return Ok(exact);
        }

        self.store.emit(IndexEvent::FallbackLookup {
            title: title.to_string(),
        });
        let (first, candidates) = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(SELECT_LIKE)?;
            let mut rows = stmt.query_map([title], entry_from_row)?;
            let first = rows.next().transpose()?;
            let candidates = first.as_ref().map_or(0, |_| 1 + rows.count());
            Ok((first, candidates))
        })?;

        if candidates > 1 {
            if let Some(chosen) = &first {
                self.store.emit(IndexEvent::AmbiguousMatch {
                    title: title.to_string(),
                    candidates,
                    chosen: chosen.clone(),
                });
            }
        }
        Ok(first)
    }

    pub fn find_by_id(&self, article_id: u64) -> Result<Option<IndexEntry>> {
        let id = sql_int(article_id)?;
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row(SELECT_BY_ID, [id], entry_from_row)
                .optional()?)
        })
    }

    /// Append a derived fact for `article_id`; see [`FactStore::record`](super::FactStore::record).
    pub fn record_derived_fact(&self, article_id: u64, payload: &str) -> Result<()> {
        self.store.facts().record(article_id, payload)
    }

    pub fn len(&self) -> Result<u64> {
        self.store.with_conn(|conn| count_rows(conn))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn count_rows(conn: &rusqlite::Connection) -> Result<u64> {
    let rows: i64 = conn.query_row("SELECT COUNT(*) FROM page_seeks", [], |row| row.get(0))?;
    Ok(rows as u64)
}

/// Insert one entry; a repeated identifier comes back as a skipped line.
fn insert_entry(
    insert: &mut rusqlite::Statement<'_>,
    entry: &IndexEntry,
    line_no: u64,
) -> Result<Option<LineError>> {
    let id = sql_int(entry.article_id)?;
    let offset = sql_int(entry.byte_offset)?;
    match insert.execute(params![id, entry.title, offset]) {
        Ok(_) => Ok(None),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Ok(Some(LineError {
                line_no,
                line: entry.to_string(),
                fault: LineFault::DuplicateIdentifier(entry.article_id),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<IndexEntry> {
    let article_id: i64 = row.get(0)?;
    let byte_offset: i64 = row.get(2)?;
    Ok(IndexEntry {
        article_id: article_id as u64,
        title: row.get(1)?,
        byte_offset: byte_offset as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSink, RecordingSink};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex, OnceLock, Weak};
    use std::time::Duration;

    fn built(listing: &str) -> (IndexStore, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let store = IndexStore::open_in_memory().unwrap().with_sink(sink.clone());
        store.seek_index().build(listing.as_bytes()).unwrap();
        (store, sink)
    }

    fn ambiguous_count(sink: &RecordingSink) -> usize {
        sink.count(|e| matches!(e, IndexEvent::AmbiguousMatch { .. }))
    }

    #[test]
    fn find_returns_listed_offset_and_id() {
        let (store, _) = built("100:1:Alpha\n250:2:Beta\n250:3:Beta Two\n");
        let index = store.seek_index();

        for (title, id, offset) in [("Alpha", 1, 100), ("Beta", 2, 250), ("Beta Two", 3, 250)] {
            let entry = index.find(title).unwrap().unwrap();
            assert_eq!(entry.article_id, id);
            assert_eq!(entry.byte_offset, offset);
        }
        assert_eq!(index.find_by_id(2).unwrap().unwrap().title, "Beta");
        assert!(index.find_by_id(99).unwrap().is_none());
        assert_eq!(index.len().unwrap(), 3);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let sink = Arc::new(RecordingSink::new());
        let store = IndexStore::open_in_memory().unwrap().with_sink(sink.clone());
        let report = store
            .seek_index()
            .build(&b"100:1:Alpha\n100:Alpha\nabc:2:Beta\n250:x:Gamma\n250:4:Delta\n"[..])
            .unwrap();

        assert_eq!(report.inserted, 2);
        let skipped: Vec<u64> = report.skipped.iter().map(|e| e.line_no).collect();
        assert_eq!(skipped, vec![2, 3, 4]);
        assert_eq!(sink.count(|e| matches!(e, IndexEvent::MalformedLine(_))), 3);
        assert!(store.seek_index().find("Delta").unwrap().is_some());
        assert!(store.seek_index().find("Beta").unwrap().is_none());
    }

    #[test]
    fn duplicate_identifier_is_skipped() {
        let store = IndexStore::open_in_memory().unwrap();
        let report = store
            .seek_index()
            .build(&b"100:1:Alpha\n250:1:Alpha again\n"[..])
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped[0].fault, LineFault::DuplicateIdentifier(1));
        assert_eq!(report.skipped[0].line, "250:1:Alpha again");
    }

    #[test]
    fn second_build_is_rejected() {
        let (store, _) = built("100:1:Alpha\n");
        let err = store.seek_index().build(&b"250:2:Beta\n"[..]).unwrap_err();
        assert!(matches!(err, Error::AlreadyPopulated { rows: 1 }));
        assert!(store.seek_index().find("Beta").unwrap().is_none());
    }

    #[test]
    fn case_insensitive_fallback_single_match() {
        let (store, sink) = built("100:1:Alpha\n250:2:Beta\n");
        let entry = store.seek_index().find("alpha").unwrap().unwrap();
        assert_eq!(entry.article_id, 1);
        assert_eq!(ambiguous_count(&sink), 0);
        assert_eq!(
            sink.count(|e| matches!(e, IndexEvent::FallbackLookup { title } if title == "alpha")),
            1
        );
    }

    #[test]
    fn ambiguous_fallback_returns_first_and_warns() {
        let (store, sink) = built("100:7:ALPHA\n250:3:Alpha\n300:9:Beta\n");
        let index = store.seek_index();

        // Exact hit never consults the fallback
        assert_eq!(index.find("Alpha").unwrap().unwrap().article_id, 3);
        assert_eq!(ambiguous_count(&sink), 0);

        let entry = index.find("alpha").unwrap().unwrap();
        assert_eq!(entry.article_id, 7);
        let events = sink.events();
        let Some(IndexEvent::AmbiguousMatch { candidates, chosen, .. }) = events.last() else {
            panic!("no ambiguity reported: {events:?}");
        };
        assert_eq!(*candidates, 2);
        assert_eq!(chosen.article_id, 7);
    }

    #[test]
    fn fallback_treats_title_as_pattern() {
        let (store, _) = built("100:1:Alpha Centauri\n");
        let entry = store.seek_index().find("alpha%").unwrap().unwrap();
        assert_eq!(entry.title, "Alpha Centauri");
    }

    #[test]
    fn missing_title_is_none() {
        let (store, _) = built("100:1:Alpha\n");
        assert!(store.seek_index().find("Gamma").unwrap().is_none());
    }

    #[test]
    fn reload_gives_identical_lookups() {
        let listing = "100:1:Alpha\n100:2:ALPHA\n250:3:Beta\n400:4:Talk:Beta\n";
        let probes = ["Alpha", "alpha", "beta", "Talk:Beta", "talk:%", "Gamma"];
        let (store, _) = built(listing);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        store.persist_to(&path).unwrap();
        let reloaded = IndexStore::open(&path).unwrap();

        for probe in probes {
            assert_eq!(
                store.seek_index().find(probe).unwrap(),
                reloaded.seek_index().find(probe).unwrap(),
                "probe {probe}"
            );
        }
        assert!(matches!(
            reloaded.seek_index().build(listing.as_bytes()),
            Err(Error::AlreadyPopulated { rows: 4 })
        ));
    }

    /// Sink that reads the index back from inside `emit`.
    #[derive(Default)]
    struct CountingSink {
        store: OnceLock<Weak<IndexStore>>,
        seen_len: Mutex<Vec<u64>>,
    }

    impl EventSink for CountingSink {
        fn emit(&self, event: IndexEvent) {
            if !matches!(event, IndexEvent::MalformedLine(_) | IndexEvent::BuildProgress { .. }) {
                return;
            }
            if let Some(store) = self.store.get().and_then(Weak::upgrade) {
                let len = store.seek_index().len().unwrap();
                self.seen_len.lock().unwrap().push(len);
            }
        }
    }

    #[test]
    fn sink_may_query_the_store_during_build() {
        let sink = Arc::new(CountingSink::default());
        let store = Arc::new(
            IndexStore::open_in_memory()
                .unwrap()
                .with_sink(sink.clone())
                .with_progress_interval(1),
        );
        sink.store.set(Arc::downgrade(&store)).ok().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let worker_store = store.clone();
        std::thread::spawn(move || {
            let report = worker_store.seek_index().build(&b"100:1:Alpha\nbroken\n"[..]);
            done_tx.send(report.map(|r| r.inserted)).unwrap();
        });

        let inserted = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("build blocked on its own event sink")
            .unwrap();
        assert_eq!(inserted, 1);
        // Two progress events and one malformed line, all seen after commit
        assert_eq!(*sink.seen_len.lock().unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn progress_reported_every_interval() {
        let sink = Arc::new(RecordingSink::new());
        let store = IndexStore::open_in_memory()
            .unwrap()
            .with_sink(sink.clone())
            .with_progress_interval(2);
        store
            .seek_index()
            .build(&b"1:1:A\n1:2:B\nbad\n1:4:D\n1:5:E\n"[..])
            .unwrap();

        let progress: Vec<IndexEvent> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, IndexEvent::BuildProgress { .. }))
            .collect();
        assert_eq!(
            progress,
            vec![
                IndexEvent::BuildProgress { lines: 2, inserted: 2 },
                IndexEvent::BuildProgress { lines: 4, inserted: 3 },
            ]
        );
        assert_eq!(sink.events().first(), Some(&IndexEvent::BuildStarted));
        assert_eq!(
            sink.events().last(),
            Some(&IndexEvent::BuildFinished { inserted: 4, skipped: 1 })
        );
    }

    #[test]
    fn builds_from_bz2_listing() {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages-index.txt.bz2");
        let mut encoder = BzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"100:1:Alpha\n250:2:Beta\n").unwrap();
        encoder.finish().unwrap();

        let store = IndexStore::open_in_memory().unwrap();
        let report = store.seek_index().build_from_path(&path).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(store.seek_index().find("Beta").unwrap().unwrap().byte_offset, 250);
    }
}
