use rusqlite::OptionalExtension;

use super::IndexEntry;
use super::store::{IndexStore, sql_int};
use crate::error::{Error, Result};
use crate::events::IndexEvent;

/// Append-only facts about articles, such as file names found in their markup.
#[derive(Clone, Copy)]
pub struct FactStore<'s> {
    store: &'s IndexStore,
}

impl<'s> FactStore<'s> {
    pub(crate) fn new(store: &'s IndexStore) -> Self {
        Self { store }
    }

    /// Append `payload` for `article_id`.
    ///
    /// The identifier is checked against the seek table first; an unknown
    /// identifier is still recorded but raises [`IndexEvent::UnknownArticle`].
    pub fn record(&self, article_id: u64, payload: &str) -> Result<()> {
        let id = sql_int(article_id)?;
        let known = self.store.with_conn(|conn| {
            let known = conn
                .query_row("SELECT 1 FROM page_seeks WHERE article_id = ?1", [id], |_| Ok(()))
                .optional()?
                .is_some();
            conn.execute(
                "INSERT INTO derived_facts (article_id, payload) VALUES (?1, ?2)",
                rusqlite::params![id, payload],
            )?;
            Ok(known)
        })?;

        if !known {
            self.store.emit(IndexEvent::UnknownArticle { article_id });
        }
        Ok(())
    }

    /// Resolve `title` through the seek index, then record the fact against
    /// the entry it resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotIndexed`] when the title cannot be resolved.
    pub fn record_for_title(&self, title: &str, payload: &str) -> Result<IndexEntry> {
        let entry = self
            .store
            .seek_index()
            .find(title)?
            .ok_or_else(|| Error::NotIndexed(title.to_string()))?;
        self.record(entry.article_id, payload)?;
        Ok(entry)
    }

    /// Payloads recorded for `article_id`, oldest first
    pub fn for_article(&self, article_id: u64) -> Result<Vec<String>> {
        let id = sql_int(article_id)?;
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT payload FROM derived_facts WHERE article_id = ?1 ORDER BY rowid",
            )?;
            let payloads = stmt
                .query_map([id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(payloads)
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.store.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM derived_facts", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}
