//! Single-range `Range: bytes=...` parsing for downloads.

use crate::error::DocumentError;

/// Inclusive byte range within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for an object of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parse `bytes=a-b`, `bytes=a-` or `bytes=-n` against an object of `size` bytes.
///
/// The end is clamped to the last byte. Multiple ranges, malformed values and
/// ranges starting past the end are rejected.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, DocumentError> {
    let ranges = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| invalid("Range header must use the bytes unit"))?;
    if ranges.contains(',') {
        return Err(invalid("Multiple ranges are not supported"));
    }

    let (start, end) = ranges
        .split_once('-')
        .ok_or_else(|| invalid("Malformed Range header"))?;
    let (start, end) = (start.trim(), end.trim());

    if size == 0 {
        return Err(unsatisfiable(size));
    }
    let last = size - 1;

    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(invalid("Malformed Range header")),
        // Suffix: the final n bytes
        (true, false) => {
            let suffix = parse_offset(end)?;
            if suffix == 0 {
                return Err(unsatisfiable(size));
            }
            ByteRange {
                start: size.saturating_sub(suffix),
                end: last,
            }
        }
        (false, true) => ByteRange {
            start: parse_offset(start)?,
            end: last,
        },
        (false, false) => {
            let start = parse_offset(start)?;
            let end = parse_offset(end)?;
            if end < start {
                return Err(invalid("Range end precedes range start"));
            }
            ByteRange {
                start,
                end: end.min(last),
            }
        }
    };

    if range.start > last {
        return Err(unsatisfiable(size));
    }
    Ok(range)
}

fn parse_offset(value: &str) -> Result<u64, DocumentError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("Malformed Range header"));
    }
    value
        .parse()
        .map_err(|_| invalid("Range offset out of bounds"))
}

fn invalid(message: &str) -> DocumentError {
    DocumentError::InvalidArgument(message.to_string())
}

fn unsatisfiable(size: u64) -> DocumentError {
    DocumentError::InvalidArgument(format!("Range not satisfiable for {size} byte document"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_range() {
        let range = parse_range("bytes=100-199", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 100, end: 199 });
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 100-199/1000");
    }

    #[test]
    fn test_open_and_suffix_ranges() {
        assert_eq!(
            parse_range("bytes=900-", 1000).unwrap(),
            ByteRange { start: 900, end: 999 }
        );
        assert_eq!(
            parse_range("bytes=-100", 1000).unwrap(),
            ByteRange { start: 900, end: 999 }
        );
        assert_eq!(
            parse_range("bytes=-5000", 1000).unwrap(),
            ByteRange { start: 0, end: 999 }
        );
    }

    #[test]
    fn test_end_is_clamped() {
        let range = parse_range("bytes=990-2000", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 990, end: 999 });
        assert_eq!(range.len(), 10);
    }

    #[test]
    fn test_rejected_ranges() {
        for header in [
            "items=0-10",
            "bytes=",
            "bytes=-",
            "bytes=abc-10",
            "bytes=10-5",
            "bytes=0-1,5-6",
            "bytes=1000-",
            "bytes=-0",
            "bytes=+5-10",
        ] {
            assert!(
                matches!(
                    parse_range(header, 1000),
                    Err(DocumentError::InvalidArgument(_))
                ),
                "{header} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_object_has_no_satisfiable_range() {
        assert!(parse_range("bytes=0-", 0).is_err());
    }
}
