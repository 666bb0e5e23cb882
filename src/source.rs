//! Source buffer shared by the whole pipeline.
//!
//! Every token stores byte offsets into this buffer so JSON and SQL literals
//! can later be sliced verbatim from the original text.

use core::fmt;

/// Half-open byte range into a source buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        ByteRange { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Join two ranges into the smallest range covering both.
    #[inline]
    pub fn cover(&self, other: ByteRange) -> ByteRange {
        ByteRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    #[inline]
    pub fn slice<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Owned UTF-8 source text plus a byte-offset index of line starts.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    text: String,
    line_starts: Vec<usize>,
}

impl SourceBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceBuffer { text, line_starts }
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// 1-based line number of a byte offset.
    pub fn line_of(&self, offset: usize) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx as u32 + 1,
            Err(idx) => idx as u32,
        }
    }

    /// 1-based column (byte within the line) of a byte offset.
    pub fn column_of(&self, offset: usize) -> u32 {
        let line = self.line_of(offset) as usize;
        let start = self.line_starts[line - 1];
        (offset - start) as u32 + 1
    }

    /// The text of a 1-based line, without its terminator.
    pub fn line_text(&self, line: u32) -> &str {
        let idx = (line as usize).saturating_sub(1);
        let start = match self.line_starts.get(idx) {
            Some(&s) => s,
            None => return "",
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches('\r')
    }

    #[inline]
    pub fn slice(&self, range: ByteRange) -> &str {
        range.slice(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_maps_offsets() {
        let buf = SourceBuffer::new("ab\ncd\n\nef");
        assert_eq!(buf.line_count(), 4);
        assert_eq!(buf.line_of(0), 1);
        assert_eq!(buf.line_of(2), 1);
        assert_eq!(buf.line_of(3), 2);
        assert_eq!(buf.line_of(6), 3);
        assert_eq!(buf.line_of(7), 4);
        assert_eq!(buf.column_of(4), 2);
        assert_eq!(buf.line_text(2), "cd");
        assert_eq!(buf.line_text(3), "");
    }

    #[test]
    fn slices_are_verbatim() {
        let buf = SourceBuffer::new("select * from t;");
        let r = ByteRange::new(0, 6);
        assert_eq!(buf.slice(r), "select");
        assert_eq!(r.cover(ByteRange::new(9, 15)), ByteRange::new(0, 15));
    }
}
