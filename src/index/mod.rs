//! Seek index: article title/identifier → compressed offset of its stream.
//!
//! Two repositories share one storage handle:
//!
//! - [`SeekIndex`]: built once from the offset listing, then read-only
//! - [`FactStore`]: append-only facts derived from located articles
//!
//! Both are cheap views borrowed from an [`IndexStore`].

mod facts;
pub mod listing;
mod seek;
mod store;

pub use facts::FactStore;
pub use listing::{LineError, LineFault};
pub use seek::{BuildReport, SeekIndex};
pub use store::IndexStore;

use std::fmt;

/// One article's position in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub article_id: u64,
    /// Title as it appears in the dump, not normalized
    pub title: String,
    /// Compressed offset of the stream holding the article
    pub byte_offset: u64,
}

/// Formats the entry as a listing line, `offset:identifier:title`.
impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.byte_offset, self.article_id, self.title)
    }
}
