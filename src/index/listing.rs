//! Offset listing shipped alongside multistream dumps.
//!
//! One record per line: `offset:identifier:title`. The title is everything
//! after the second colon, so titles like `Talk:Foo:Bar` survive intact.

use std::io::BufRead;
use std::num::ParseIntError;

use thiserror::Error;

use super::IndexEntry;

/// Largest value SQLite can store in an INTEGER column.
const MAX_STORED: u64 = i64::MAX as u64;

/// Why a listing line was skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineFault {
    #[error("expected offset:identifier:title")]
    MissingFields,

    #[error("offset is not an unsigned integer: {0}")]
    BadOffset(ParseIntError),

    #[error("identifier is not an unsigned integer: {0}")]
    BadIdentifier(ParseIntError),

    #[error("value {0} is too large to store")]
    OutOfRange(u64),

    #[error("title is empty")]
    EmptyTitle,

    #[error("line is not valid UTF-8")]
    NotUtf8,

    #[error("identifier {0} already indexed")]
    DuplicateIdentifier(u64),
}

/// A skipped listing line, kept for the build report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line_no}: {fault}")]
pub struct LineError {
    /// 1-based line number in the listing
    pub line_no: u64,
    pub line: String,
    pub fault: LineFault,
}

/// Parse one listing line; surrounding whitespace is ignored.
pub fn parse_line(line: &str) -> Result<IndexEntry, LineFault> {
    let mut fields = line.trim().splitn(3, ':');
    let (Some(offset), Some(identifier), Some(title)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(LineFault::MissingFields);
    };

    let byte_offset: u64 = offset.parse().map_err(LineFault::BadOffset)?;
    let article_id: u64 = identifier.parse().map_err(LineFault::BadIdentifier)?;
    for value in [byte_offset, article_id] {
        if value > MAX_STORED {
            return Err(LineFault::OutOfRange(value));
        }
    }
    if title.is_empty() {
        return Err(LineFault::EmptyTitle);
    }

    Ok(IndexEntry {
        article_id,
        title: title.to_string(),
        byte_offset,
    })
}

/// Iterator over the records of a listing.
///
/// Yields `Err` only for I/O failures; unparseable lines come through as
/// `Ok(Err(LineError))` so the caller can skip them and keep going.
pub struct Records<B> {
    reader: B,
    line_no: u64,
    buf: Vec<u8>,
}

pub fn records<B: BufRead>(reader: B) -> Records<B> {
    Records {
        reader,
        line_no: 0,
        buf: Vec::new(),
    }
}

impl<B> Records<B> {
    /// Lines read so far
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

impl<B: BufRead> Iterator for Records<B> {
    type Item = std::io::Result<Result<IndexEntry, LineError>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                let line_no = self.line_no;
                let parsed = match std::str::from_utf8(&self.buf) {
                    Ok(line) => parse_line(line).map_err(|fault| LineError {
                        line_no,
                        line: line.trim_end().to_string(),
                        fault,
                    }),
                    Err(_) => Err(LineError {
                        line_no,
                        line: String::from_utf8_lossy(&self.buf).trim_end().to_string(),
                        fault: LineFault::NotUtf8,
                    }),
                };
                Some(Ok(parsed))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let entry = parse_line("617:12:Anarchism").unwrap();
        assert_eq!(entry.byte_offset, 617);
        assert_eq!(entry.article_id, 12);
        assert_eq!(entry.title, "Anarchism");
    }

    #[test]
    fn title_keeps_later_colons() {
        let entry = parse_line("617:25:Talk:Foo: bar").unwrap();
        assert_eq!(entry.title, "Talk:Foo: bar");
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let entry = parse_line("  100:1:Alpha \t\r\n").unwrap();
        assert_eq!(entry.title, "Alpha");
        assert_eq!(entry.byte_offset, 100);
    }

    #[test]
    fn classifies_malformed_lines() {
        assert_eq!(parse_line("100:1"), Err(LineFault::MissingFields));
        assert_eq!(parse_line(""), Err(LineFault::MissingFields));
        assert!(matches!(parse_line("x:1:Alpha"), Err(LineFault::BadOffset(_))));
        assert!(matches!(parse_line("-5:1:Alpha"), Err(LineFault::BadOffset(_))));
        assert!(matches!(parse_line("100:one:Alpha"), Err(LineFault::BadIdentifier(_))));
        assert_eq!(parse_line("100:1:"), Err(LineFault::EmptyTitle));
        assert_eq!(
            parse_line("18446744073709551615:1:Alpha"),
            Err(LineFault::OutOfRange(u64::MAX))
        );
    }

    #[test]
    fn records_number_lines_and_keep_going() {
        let listing = b"100:1:Alpha\nbroken\n250:2:Beta\n\xff\xfe:3:Gamma\n";
        let items: Vec<_> = records(&listing[..]).map(|r| r.unwrap()).collect();
        assert_eq!(items.len(), 4);

        assert_eq!(items[0].as_ref().unwrap().title, "Alpha");
        let err = items[1].as_ref().unwrap_err();
        assert_eq!(err.line_no, 2);
        assert_eq!(err.line, "broken");
        assert_eq!(err.fault, LineFault::MissingFields);
        assert_eq!(items[2].as_ref().unwrap().byte_offset, 250);
        assert_eq!(items[3].as_ref().unwrap_err().fault, LineFault::NotUtf8);
    }

    #[test]
    fn last_line_without_newline_is_read() {
        let items: Vec<_> = records(&b"100:1:Alpha\n250:2:Beta"[..])
            .map(|r| r.unwrap().unwrap())
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title, "Beta");
    }
}
