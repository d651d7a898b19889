//! Carry-over state between independently terminated bzip2 streams.
//!
//! Chunk reads almost never end where a stream ends. When the decompressor
//! reports end of stream, whatever it did not consume from the current input
//! is the beginning of the next stream; those bytes stay in `pending` and are
//! the first thing the next decompressor sees.

use bzip2::{Decompress, Status};

use super::structures::Block;
use crate::error::{Error, FramingFault, Result};

/// Output growth step while a block is being decompressed.
const OUTPUT_STEP: usize = 256 * 1024;

/// Splits a sequence of compressed bytes into decompressed blocks.
///
/// Performs no I/O: callers `push` whatever they read and call `next_block`
/// until it returns `None`, which means more input is needed.
pub struct BlockFramer {
    /// Compressed bytes received but not yet consumed by `decoder`
    pending: Vec<u8>,
    decoder: Decompress,
    /// Decompressed output of the block in progress
    output: Vec<u8>,
    /// Absolute compressed offset of the block in progress
    block_start: u64,
    /// Absolute compressed offset of the first byte in `pending`
    consumed: u64,
    /// The last decompress call made progress, so it may have more to flush
    /// even with no new input.
    draining: bool,
    max_block_bytes: usize,
}

impl BlockFramer {
    pub fn new(start_offset: u64, max_block_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            decoder: Decompress::new(false),
            output: Vec::new(),
            block_start: start_offset,
            consumed: start_offset,
            draining: false,
            max_block_bytes,
        }
    }

    /// Append compressed bytes read from the archive.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Number of received bytes the decompressor has not consumed yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Absolute offset where the block currently being assembled starts.
    pub fn block_start(&self) -> u64 {
        self.block_start
    }

    /// Complete the next block from buffered input.
    ///
    /// Returns `Ok(None)` when the buffered input runs out before the
    /// end-of-stream marker.
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        loop {
            if self.pending.is_empty() && !self.draining {
                return Ok(None);
            }

            if self.output.capacity() == self.output.len() {
                self.output.reserve(OUTPUT_STEP);
            }

            let in_before = self.decoder.total_in();
            let out_before = self.output.len();
            let status = self
                .decoder
                .decompress_vec(&self.pending, &mut self.output)
                .map_err(|e| Error::framing(self.block_start, e))?;

            let used = (self.decoder.total_in() - in_before) as usize;
            let produced = self.output.len() - out_before;
            self.pending.drain(..used);
            self.consumed += used as u64;

            let compressed_len = self.consumed - self.block_start;
            if self.output.len() > self.max_block_bytes
                || compressed_len > self.max_block_bytes as u64
            {
                return Err(Error::framing(
                    self.block_start,
                    FramingFault::Oversized {
                        limit: self.max_block_bytes,
                    },
                ));
            }

            if matches!(status, Status::StreamEnd) {
                return Ok(Some(self.complete_block()));
            }

            self.draining = used > 0 || produced > 0;
            if !self.draining {
                return Ok(None);
            }
        }
    }

    /// Signal that no more input will arrive.
    ///
    /// Fails if a block was started but never reached its end-of-stream
    /// marker, or if unconsumed bytes remain.
    pub fn finish(&self) -> Result<()> {
        let started = self.consumed > self.block_start || !self.output.is_empty();
        if started || !self.pending.is_empty() {
            return Err(Error::framing(self.block_start, FramingFault::Truncated));
        }
        Ok(())
    }

    fn complete_block(&mut self) -> Block {
        let block = Block {
            offset: self.block_start,
            compressed_len: self.consumed - self.block_start,
            data: std::mem::take(&mut self.output),
        };

        // A finished decompressor rejects further input; the carried-over
        // bytes in `pending` seed a fresh one.
        self.decoder = Decompress::new(false);
        self.block_start = self.consumed;
        self.draining = false;
        block
    }
}
