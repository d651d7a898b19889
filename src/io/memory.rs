use super::ReadAt;
use anyhow::Result;
use async_trait::async_trait;

/// Archive bytes already held in memory.
///
/// `with_max_read` caps every read, which is how short reads from a real
/// device are reproduced.
pub struct MemoryReader {
    data: Vec<u8>,
    max_read: usize,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            max_read: usize::MAX,
        }
    }

    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.max_read).min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
