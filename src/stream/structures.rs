use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::FramingFault;

/// 48-bit magic that opens the first element after a stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadingMagic {
    /// A compressed block follows (pi, `0x314159265359`)
    Block,
    /// The stream is empty and ends right here (sqrt(pi), `0x177245385090`)
    EndOfStream,
}

impl LeadingMagic {
    pub const BLOCK: u64 = 0x3141_5926_5359;
    pub const END_OF_STREAM: u64 = 0x1772_4538_5090;

    pub fn from_u48(value: u64) -> Option<Self> {
        match value {
            Self::BLOCK => Some(LeadingMagic::Block),
            Self::END_OF_STREAM => Some(LeadingMagic::EndOfStream),
            _ => None,
        }
    }
}

/// bzip2 stream header plus the magic of its first element - 10 bytes
///
/// Only the first element's magic sits on a byte boundary; everything after
/// it is bit-packed, so this is as far as a cheap resynchronization check can
/// look without running the decompressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Block size level, 1..=9 (x 100 kB)
    pub level: u8,
    pub leading: LeadingMagic,
}

impl StreamHeader {
    pub const SIGNATURE: &'static [u8] = b"BZh";
    pub const SIZE: usize = 10;

    pub fn from_bytes(data: &[u8]) -> Result<Self, FramingFault> {
        if data.len() < Self::SIZE || &data[0..3] != Self::SIGNATURE {
            return Err(FramingFault::BadHeader);
        }

        let level = match data[3] {
            b @ b'1'..=b'9' => b - b'0',
            _ => return Err(FramingFault::BadHeader),
        };

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let magic = cursor
            .read_u48::<BigEndian>()
            .map_err(|_| FramingFault::BadHeader)?;
        let leading = LeadingMagic::from_u48(magic).ok_or(FramingFault::BadHeader)?;

        Ok(Self { level, leading })
    }
}

/// One decompressed block of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Compressed offset at which the block's stream header starts
    pub offset: u64,
    /// Number of compressed bytes the stream occupied
    pub compressed_len: u64,
    pub data: Vec<u8>,
}

impl Block {
    /// Compressed offset of the byte right after this block
    pub fn end_offset(&self) -> u64 {
        self.offset + self.compressed_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_header() {
        let header = StreamHeader::from_bytes(b"BZh91AY&SY\x00").unwrap();
        assert_eq!(header.level, 9);
        assert_eq!(header.leading, LeadingMagic::Block);
    }

    #[test]
    fn parses_empty_stream_header() {
        let header = StreamHeader::from_bytes(b"BZh1\x17\x72\x45\x38\x50\x90").unwrap();
        assert_eq!(header.level, 1);
        assert_eq!(header.leading, LeadingMagic::EndOfStream);
    }

    #[test]
    fn rejects_bad_headers() {
        for bad in [
            &b"BZh0"[..],
            &b"BZh91AY&SY"[..9],
            &b"BZh01AY&SY"[..],
            &b"BZhA1AY&SY"[..],
            &b"XZh91AY&SY"[..],
            &b"BZh91AY&SX"[..],
            &b"<page><tit"[..],
        ] {
            assert!(
                matches!(StreamHeader::from_bytes(bad), Err(FramingFault::BadHeader)),
                "accepted {:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }
}
