//! Splits streamed output chunks into whole lines

/// Longest line held back waiting for a newline; longer runs are emitted in pieces
pub const MAX_LINE: usize = 64 * 1024;

/// Accumulates bytes until a newline completes a line
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE)
    }
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer that emits a partial line once it reaches `max_line` bytes
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line: max_line.max(1),
        }
    }

    /// Bytes waiting for a newline
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed a chunk and return every line it completed
    ///
    /// Only the new chunk is scanned; earlier bytes are never rescanned.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = data;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..pos], &mut lines);
            let line = std::mem::take(&mut self.pending);
            lines.push(decode(&line));
            rest = &rest[pos + 1..];
        }
        self.append(rest, &mut lines);

        lines
    }

    fn append(&mut self, mut bytes: &[u8], lines: &mut Vec<String>) {
        while self.pending.len() + bytes.len() > self.max_line {
            let take = self.max_line - self.pending.len();
            self.pending.extend_from_slice(&bytes[..take]);
            let line = std::mem::take(&mut self.pending);
            lines.push(decode(&line));
            bytes = &bytes[take..];
        }
        self.pending.extend_from_slice(bytes);
    }

    /// Return the trailing partial line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(decode(&line))
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"hel").is_empty());
        assert_eq!(buf.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(buf.push(b"ld\n\nx"), vec!["world", ""]);
        assert_eq!(buf.finish(), Some("x".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"a\r\nb\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_multibyte_char_split_between_chunks() {
        let mut buf = LineBuffer::new();
        let text = "héllo\n".as_bytes();
        assert!(buf.push(&text[..2]).is_empty());
        assert_eq!(buf.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_long_line_without_newline_is_emitted_in_pieces() {
        let mut buf = LineBuffer::with_max_line(8);
        assert_eq!(buf.push(b"abcdefghijklmnopqrst"), vec!["abcdefgh", "ijklmnop"]);
        assert_eq!(buf.pending_len(), 4);
        assert_eq!(buf.push(b"uv\n"), vec!["qrstuv"]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_line_of_exactly_max_length_is_not_split() {
        let mut buf = LineBuffer::with_max_line(4);
        assert!(buf.push(b"abcd").is_empty());
        assert_eq!(buf.push(b"\nx"), vec!["abcd"]);
        assert_eq!(buf.finish(), Some("x".to_string()));
    }

    #[test]
    fn test_unterminated_stream_stays_bounded() {
        let mut buf = LineBuffer::new();
        let chunk = vec![b'#'; 32 * 1024];
        let mut emitted = 0;

        for _ in 0..256 {
            for line in buf.push(&chunk) {
                assert_eq!(line.len(), MAX_LINE);
                emitted += 1;
            }
            assert!(buf.pending_len() <= MAX_LINE);
        }

        // 8 MiB in 64 KiB lines, the last one still held back
        assert_eq!(emitted, 127);
        assert_eq!(buf.pending_len(), MAX_LINE);
        assert_eq!(buf.finish().map(|l| l.len()), Some(MAX_LINE));
    }
}
