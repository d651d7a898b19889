//! Positional byte sources for compressed archives.
//!
//! The segmenter never shares a seek position with anyone: every read names
//! its absolute offset, so one reader can back any number of independent
//! decompression sessions.

mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for random access reading from an archive
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// May return fewer bytes than requested; `Ok(0)` means end of data.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Fill `buf` from `offset`, retrying short reads until the buffer is full or
/// the source runs out. Returns the number of bytes actually read.
pub async fn read_full<R: ReadAt + ?Sized>(reader: &R, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let at = offset + filled as u64;
        if at >= reader.size() {
            break;
        }
        let n = reader.read_at(at, &mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
