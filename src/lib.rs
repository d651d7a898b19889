//! # wikiseek
//!
//! Random access to single articles in multistream `.xml.bz2` dumps.
//!
//! A multistream dump is a concatenation of independent bzip2 streams of
//! about a hundred pages each, shipped with an offset listing of
//! `offset:identifier:title` lines. This crate turns the listing into a
//! seek index and uses it to decompress only the stream that holds a
//! requested article, from a local file or over HTTP Range requests.
//!
//! ## Features
//!
//! - Stream-by-stream decompression that resynchronizes at any stream offset
//! - SQLite-backed seek index with exact-then-`LIKE` title lookup
//! - Append-only derived facts stored next to the index
//! - Pluggable document parser for resolving an article inside its block
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use wikiseek::{IndexStore, LocalFileReader, PageLocator, PageSliceParser};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = IndexStore::open(Path::new("index.sqlite"))?;
//!     let archive = Arc::new(LocalFileReader::new(Path::new(
//!         "enwiki-pages-articles-multistream.xml.bz2",
//!     ))?);
//!
//!     let locator = PageLocator::new(store.seek_index(), archive, PageSliceParser);
//!     let found = locator.locate("Anarchism").await?;
//!     println!("{}", found.article.xml);
//!
//!     store.facts().record(found.entry.article_id, "Anarchism.ogg")?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod events;
pub mod index;
pub mod io;
pub mod locator;
pub mod parser;
pub mod stream;

pub use cli::Cli;
pub use error::{Error, FramingFault, Result};
pub use events::{EventSink, IndexEvent, RecordingSink, TracingSink};
pub use index::{BuildReport, FactStore, IndexEntry, IndexStore, LineError, LineFault, SeekIndex};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use locator::{Located, PageLocator};
pub use parser::{DocumentParser, PageSliceParser, PageXml};
pub use stream::{Block, BlockFramer, BlockSegmenter, SegmenterConfig};
