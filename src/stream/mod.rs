//! Segmented decompression of multistream bzip2 archives.
//!
//! ## Archive Layout
//!
//! A multistream dump is a plain concatenation of complete bzip2 streams:
//!
//! ```text
//! | BZh9 ... EOS | BZh9 ... EOS | BZh9 ... EOS | ...
//! ^ offset 0     ^ offset a     ^ offset b
//! ```
//!
//! Each stream decompresses on its own given its starting offset, which is
//! what makes random access through a seek index possible. Nothing outside
//! the compressed data marks where a stream ends; the boundary is only known
//! once the decompressor reports end of stream.
//!
//! ## Components
//!
//! - [`structures`]: stream header and decompressed [`Block`]
//! - [`framer`]: I/O-free carry-over state between consecutive streams
//! - [`segmenter`]: reads an archive source and drives the framer

mod framer;
mod segmenter;
mod structures;

pub use framer::BlockFramer;
pub use segmenter::{BlockSegmenter, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BLOCK_BYTES, SegmenterConfig};
pub use structures::{Block, LeadingMagic, StreamHeader};
