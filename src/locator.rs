//! Title → article, touching only the one block that holds it.
//!
//! ## Session States
//!
//! ```text
//! Idle → IndexLookup → Decompressing → ParsingBlock → Found
//!             │              │               └──────→ BlockMismatch
//!             │              └─────────────────────→ Framing / Read
//!             └────────────────────────────────────→ NotIndexed
//! ```
//!
//! Nothing survives between two `locate` calls: each one opens its own
//! [`BlockSegmenter`] with its own read cursor.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, FramingFault, Result};
use crate::index::{IndexEntry, SeekIndex};
use crate::io::ReadAt;
use crate::parser::DocumentParser;
use crate::stream::{Block, BlockSegmenter, SegmenterConfig};

/// A successfully located article
#[derive(Debug, Clone)]
pub struct Located<A> {
    /// Index entry the title resolved to
    pub entry: IndexEntry,
    /// The decompressed block the article was found in
    pub block: Block,
    pub article: A,
}

/// Composes the seek index, the archive and a document parser.
pub struct PageLocator<'s, R: ReadAt, P> {
    index: SeekIndex<'s>,
    reader: Arc<R>,
    parser: P,
    config: SegmenterConfig,
}

impl<'s, R: ReadAt, P: DocumentParser> PageLocator<'s, R, P> {
    pub fn new(index: SeekIndex<'s>, reader: Arc<R>, parser: P) -> Self {
        Self {
            index,
            reader,
            parser,
            config: SegmenterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SegmenterConfig) -> Self {
        self.config = config;
        self
    }

    /// Locate the article titled `title`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotIndexed`] if the index has no entry for the title
    /// - [`Error::Framing`] if no valid block starts at the indexed offset
    /// - [`Error::BlockMismatch`] if the block does not contain the article,
    ///   which means the index does not belong to this archive
    pub async fn locate(&self, title: &str) -> Result<Located<P::Article>> {
        debug!(title = %title, "index lookup");
        let entry = self
            .index
            .find(title)?
            .ok_or_else(|| Error::NotIndexed(title.to_string()))?;

        debug!(title = %title, offset = entry.byte_offset, "decompressing");
        let mut segmenter =
            BlockSegmenter::open(self.reader.clone(), entry.byte_offset, self.config).await?;
        let block = segmenter.next_block().await?.ok_or_else(|| {
            Error::framing(entry.byte_offset, FramingFault::Truncated)
        })?;

        // The index may have resolved a differently-cased title; the block
        // is searched for the title as stored.
        debug!(title = %entry.title, bytes = block.data.len(), "parsing block");
        let article = self
            .parser
            .find_article(&block.data, &entry.title)
            .map_err(|e| Error::Parser(Box::new(e)))?
            .ok_or_else(|| Error::BlockMismatch {
                title: entry.title.clone(),
                offset: entry.byte_offset,
            })?;

        debug!(title = %entry.title, article_id = entry.article_id, "found");
        Ok(Located {
            entry,
            block,
            article,
        })
    }

    /// Locate every title in turn, one failure never stopping the batch.
    pub async fn locate_all<I, S>(&self, titles: I) -> Vec<(String, Result<Located<P::Article>>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut results = Vec::new();
        for title in titles {
            let title = title.as_ref();
            let result = self.locate(title).await;
            match &result {
                Err(e) if e.is_expected() => debug!(title = %title, "not indexed"),
                Err(e) if e.is_integrity_failure() => {
                    warn!(title = %title, error = %e, "index and archive disagree")
                }
                Err(e) => warn!(title = %title, error = %e, "locate failed"),
                Ok(_) => {}
            }
            results.push((title.to_string(), result));
        }
        results
    }
}
