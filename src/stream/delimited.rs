//! Byte buffer that splits on a fixed delimiter across reads.

/// Accumulates bytes and yields complete delimiter-terminated segments.
///
/// Bytes after the last delimiter stay buffered until more input arrives or
/// [`take_remainder`](Self::take_remainder) is called.
#[derive(Clone, Debug)]
pub struct DelimitedBuffer {
    buf: Vec<u8>,
    delimiter: &'static [u8],
    scan_from: usize,
}

impl DelimitedBuffer {
    /// Create an empty buffer splitting on `delimiter`.
    ///
    /// An empty delimiter is treated as a single newline.
    #[must_use]
    pub const fn new(delimiter: &'static [u8]) -> Self {
        let delimiter: &'static [u8] = if delimiter.is_empty() { b"\n" } else { delimiter };
        Self {
            buf: Vec::new(),
            delimiter,
            scan_from: 0,
        }
    }

    /// Add bytes and return every segment completed by them.
    ///
    /// Empty segments (back-to-back delimiters) are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);

        let mut segments = Vec::new();
        let mut start = 0_usize;
        let mut idx = self.scan_from;
        let width = self.delimiter.len();

        while idx + width <= self.buf.len() {
            if &self.buf[idx..idx + width] == self.delimiter {
                if idx > start {
                    segments.push(self.buf[start..idx].to_vec());
                }
                idx += width;
                start = idx;
            } else {
                idx += 1;
            }
        }

        self.buf.drain(..start);
        // A delimiter may straddle this read and the next one.
        self.scan_from = self.buf.len().saturating_sub(width - 1);
        segments
    }

    /// Take whatever is buffered after the last delimiter.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        self.scan_from = 0;
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    /// Number of bytes waiting for a delimiter.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
