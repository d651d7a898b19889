use thiserror::Error;

/// Why the bytes at a block offset could not be framed as a bzip2 stream.
#[derive(Error, Debug)]
pub enum FramingFault {
    #[error("missing bzip2 stream header")]
    BadHeader,

    #[error("offset is at or past the end of the archive ({size} bytes)")]
    OutOfBounds { size: u64 },

    #[error("corrupt stream data: {0}")]
    Corrupt(#[from] bzip2::Error),

    #[error("archive ended before the end-of-stream marker")]
    Truncated,

    #[error("no end-of-stream marker within {limit} bytes")]
    Oversized { limit: usize },
}

/// Main error type for wikiseek operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Framing error in block at offset {offset}: {fault}")]
    Framing { offset: u64, fault: FramingFault },

    #[error("Index storage already holds {rows} entries")]
    AlreadyPopulated { rows: u64 },

    #[error("Title not indexed: {0}")]
    NotIndexed(String),

    #[error("Block at offset {offset} does not contain '{title}'")]
    BlockMismatch { title: String, offset: u64 },

    #[error("Archive read failed at offset {offset}: {source}")]
    Read {
        offset: u64,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Document parser failed: {0}")]
    Parser(Box<dyn std::error::Error + Send + Sync>),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage lock poisoned by a panicked writer")]
    StoragePoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for wikiseek operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn framing(offset: u64, fault: impl Into<FramingFault>) -> Self {
        Error::Framing {
            offset,
            fault: fault.into(),
        }
    }

    /// True for outcomes a batch caller should treat as routine, such as a
    /// title that simply is not in the index.
    pub fn is_expected(&self) -> bool {
        matches!(self, Error::NotIndexed(_))
    }

    /// True when the index and archive disagree or the archive is damaged.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Error::Framing { .. } | Error::BlockMismatch { .. })
    }
}
