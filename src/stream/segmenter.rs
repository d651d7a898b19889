//! Block-by-block decompression of a multistream archive.
//!
//! ## Session Lifecycle
//!
//! 1. [`BlockSegmenter::open`] reads the stream header at the requested
//!    offset and rejects anything that is not the start of a bzip2 stream
//! 2. [`BlockSegmenter::next_block`] reads fixed-size chunks into a
//!    [`BlockFramer`] until it completes a block
//! 3. End of archive after a complete block ends the sequence
//!
//! A session only moves forward. Random access means opening a new session
//! at an offset taken from the seek index.

use std::sync::Arc;

use tracing::{debug, trace};

use super::framer::BlockFramer;
use super::structures::{Block, StreamHeader};
use crate::error::{Error, FramingFault, Result};
use crate::io::{ReadAt, read_full};

/// Chunk size used to read the archive (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on one block's compressed or decompressed size (256 MiB).
///
/// Dump streams hold about a hundred pages, a few megabytes at most; hitting
/// this limit means the end-of-stream marker is missing.
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 256 * 1024 * 1024;

/// Tuning knobs for a decompression session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Bytes requested from the archive per read
    pub chunk_size: usize,
    /// Scan budget per block before giving up with a framing error
    pub max_block_bytes: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }
}

impl SegmenterConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_block_bytes(mut self, max_block_bytes: usize) -> Self {
        self.max_block_bytes = max_block_bytes.max(1);
        self
    }
}

/// Forward-only decompression session over one archive.
///
/// Owns its read cursor; the reader itself is only used for positional reads,
/// so several sessions may share one `Arc<R>`.
pub struct BlockSegmenter<R: ReadAt> {
    reader: Arc<R>,
    /// Next compressed offset to read from
    position: u64,
    framer: BlockFramer,
    chunk: Vec<u8>,
    done: bool,
}

impl<R: ReadAt> BlockSegmenter<R> {
    /// Open a session at `start_offset`.
    ///
    /// # Arguments
    ///
    /// * `reader` - Archive source
    /// * `start_offset` - Compressed offset of a stream header, normally taken
    ///   from the seek index
    /// * `config` - Chunk size and per-block scan budget
    ///
    /// # Errors
    ///
    /// Returns [`Error::Framing`] when the offset is past the end of the
    /// archive or the bytes there are not a bzip2 stream header, and
    /// [`Error::Read`] when the archive cannot be read.
    pub async fn open(reader: Arc<R>, start_offset: u64, config: SegmenterConfig) -> Result<Self> {
        let size = reader.size();
        if start_offset >= size {
            return Err(Error::framing(start_offset, FramingFault::OutOfBounds { size }));
        }

        let mut header = [0u8; StreamHeader::SIZE];
        let n = read_full(reader.as_ref(), start_offset, &mut header)
            .await
            .map_err(|e| Error::Read {
                offset: start_offset,
                source: e.into(),
            })?;
        let parsed = StreamHeader::from_bytes(&header[..n])
            .map_err(|fault| Error::framing(start_offset, fault))?;
        debug!(offset = start_offset, level = parsed.level, "opened block session");

        // The header bytes are already in hand; hand them to the framer
        // instead of reading them twice.
        let mut framer = BlockFramer::new(start_offset, config.max_block_bytes);
        framer.push(&header[..n]);

        Ok(Self {
            reader,
            position: start_offset + n as u64,
            framer,
            chunk: vec![0u8; config.chunk_size.max(1)],
            done: false,
        })
    }

    /// Decompress the next block.
    ///
    /// Returns `Ok(None)` once the archive is exhausted. After an error the
    /// session is finished and keeps returning `Ok(None)`.
    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }

        let result = self.advance().await;
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    async fn advance(&mut self) -> Result<Option<Block>> {
        loop {
            if let Some(block) = self.framer.next_block()? {
                trace!(
                    offset = block.offset,
                    compressed = block.compressed_len,
                    decompressed = block.data.len(),
                    carried = self.framer.pending_len(),
                    "block complete"
                );
                return Ok(Some(block));
            }

            if self.read_chunk().await? == 0 {
                self.framer.finish()?;
                return Ok(None);
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<usize> {
        if self.position >= self.reader.size() {
            return Ok(0);
        }

        let n = self
            .reader
            .read_at(self.position, &mut self.chunk)
            .await
            .map_err(|e| Error::Read {
                offset: self.position,
                source: e.into(),
            })?;
        self.framer.push(&self.chunk[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::stream::test_support::{compress, concat_streams};

    fn sample_pages(n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|i| {
                format!(
                    "<page><title>Page {i}</title><text>{}</text></page>",
                    "lorem ipsum ".repeat(i * 37 + 1)
                )
                .into_bytes()
            })
            .collect()
    }

    async fn collect_blocks(reader: Arc<MemoryReader>, offset: u64, config: SegmenterConfig) -> Vec<Block> {
        let mut segmenter = BlockSegmenter::open(reader, offset, config).await.unwrap();
        let mut blocks = Vec::new();
        while let Some(block) = segmenter.next_block().await.unwrap() {
            blocks.push(block);
        }
        blocks
    }

    #[tokio::test]
    async fn yields_each_stream_then_ends() {
        let pages = sample_pages(5);
        let refs: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
        let (archive, offsets) = concat_streams(&refs);
        let reader = Arc::new(MemoryReader::new(archive));

        let mut segmenter = BlockSegmenter::open(reader, 0, SegmenterConfig::default())
            .await
            .unwrap();
        for (page, offset) in pages.iter().zip(&offsets) {
            let block = segmenter.next_block().await.unwrap().unwrap();
            assert_eq!(&block.data, page);
            assert_eq!(block.offset, *offset);
        }
        assert!(segmenter.next_block().await.unwrap().is_none());
        assert!(segmenter.next_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_size_does_not_change_blocks() {
        let pages = sample_pages(4);
        let refs: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
        let (archive, _) = concat_streams(&refs);
        let reader = Arc::new(MemoryReader::new(archive));

        let baseline = collect_blocks(reader.clone(), 0, SegmenterConfig::default()).await;
        assert_eq!(baseline.len(), 4);

        for chunk_size in [1, 2, 3, 7, 13, 64, 4096] {
            let config = SegmenterConfig::default().with_chunk_size(chunk_size);
            let blocks = collect_blocks(reader.clone(), 0, config).await;
            assert_eq!(blocks, baseline, "chunk size {chunk_size}");
        }
    }

    #[tokio::test]
    async fn short_reads_do_not_change_blocks() {
        let pages = sample_pages(3);
        let refs: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
        let (archive, _) = concat_streams(&refs);

        let whole = collect_blocks(Arc::new(MemoryReader::new(archive.clone())), 0, SegmenterConfig::default()).await;
        for max_read in [1, 5, 11] {
            let reader = Arc::new(MemoryReader::new(archive.clone()).with_max_read(max_read));
            let blocks = collect_blocks(reader, 0, SegmenterConfig::default()).await;
            assert_eq!(blocks, whole, "max read {max_read}");
        }
    }

    #[tokio::test]
    async fn opens_mid_archive_at_stream_boundary() {
        let pages = sample_pages(3);
        let refs: Vec<&[u8]> = pages.iter().map(|p| p.as_slice()).collect();
        let (archive, offsets) = concat_streams(&refs);
        let reader = Arc::new(MemoryReader::new(archive));

        let blocks = collect_blocks(reader, offsets[1], SegmenterConfig::default()).await;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data, pages[1]);
        assert_eq!(blocks[1].data, pages[2]);
    }

    #[tokio::test]
    async fn rejects_offset_inside_a_stream() {
        let stream = compress(b"<page><title>Alpha</title></page>");
        let reader = Arc::new(MemoryReader::new(stream));

        let err = BlockSegmenter::open(reader, 3, SegmenterConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Framing {
                offset: 3,
                fault: FramingFault::BadHeader
            }
        ));
    }

    #[tokio::test]
    async fn rejects_offset_past_end() {
        let stream = compress(b"Alpha");
        let len = stream.len() as u64;
        let reader = Arc::new(MemoryReader::new(stream));

        let err = BlockSegmenter::open(reader, len, SegmenterConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Framing {
                fault: FramingFault::OutOfBounds { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn truncated_archive_is_framing_error() {
        let mut archive = compress(b"Alpha");
        let second = compress(b"<page>Beta</page>");
        let second_offset = archive.len() as u64;
        archive.extend_from_slice(&second[..second.len() / 2]);
        let reader = Arc::new(MemoryReader::new(archive));

        let mut segmenter = BlockSegmenter::open(reader, 0, SegmenterConfig::default().with_chunk_size(8))
            .await
            .unwrap();
        assert_eq!(segmenter.next_block().await.unwrap().unwrap().data, b"Alpha");

        let err = segmenter.next_block().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Framing {
                fault: FramingFault::Truncated,
                ..
            }
        ));
        if let Error::Framing { offset, .. } = err {
            assert_eq!(offset, second_offset);
        }
        assert!(segmenter.next_block().await.unwrap().is_none());
    }
}
