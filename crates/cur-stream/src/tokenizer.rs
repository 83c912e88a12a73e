//! Line splitting across chunk boundaries.
//!
//! [`LineTokenizer`] owns the only leftover-text buffer in the engine. Text is
//! appended as chunks arrive; complete lines are handed out one at a time and
//! consumed text is compacted away lazily so the buffer never grows past one
//! chunk plus the pending partial line.

use cur_core::error::{CapacityKind, IngestError, Result};

#[derive(Debug)]
pub struct LineTokenizer {
    buffer: String,
    /// Start of unconsumed text in `buffer`.
    cursor: usize,
    /// Where to resume the newline search; everything between `cursor` and
    /// here is known to contain no `\n`.
    scanned: usize,
    finished: bool,
    max_pending_bytes: usize,
}

impl LineTokenizer {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            scanned: 0,
            finished: false,
            max_pending_bytes,
        }
    }

    /// Append decoded text.
    ///
    /// Fails with `CapacityExceeded(LineLength)` when the unterminated tail
    /// grows beyond the pending-line limit.
    pub fn push(&mut self, text: &str) -> Result<()> {
        self.compact();
        self.buffer.push_str(text);

        let tail_start = self.buffer[self.scanned..]
            .rfind('\n')
            .map(|i| self.scanned + i + 1)
            .unwrap_or(self.cursor);
        if self.buffer.len() - tail_start > self.max_pending_bytes {
            return Err(IngestError::CapacityExceeded {
                cap: CapacityKind::LineLength,
                limit: self.max_pending_bytes,
            });
        }
        Ok(())
    }

    /// Mark end of input; the trailing unterminated line becomes available.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// `true` when [`LineTokenizer::next_line`] would return a line.
    pub fn has_line(&self) -> bool {
        if self.cursor < self.buffer.len() && self.finished {
            return true;
        }
        self.buffer[self.scanned..].contains('\n')
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    ///
    /// After [`LineTokenizer::finish`] the trailing text is returned once
    /// even without a newline.
    pub fn next_line(&mut self) -> Option<String> {
        if let Some(offset) = self.buffer[self.scanned..].find('\n') {
            let end = self.scanned + offset;
            let line = strip_cr(&self.buffer[self.cursor..end]).to_string();
            self.cursor = end + 1;
            self.scanned = self.cursor;
            return Some(line);
        }
        self.scanned = self.buffer.len();

        if self.finished && self.cursor < self.buffer.len() {
            let line = strip_cr(&self.buffer[self.cursor..]).to_string();
            self.cursor = self.buffer.len();
            self.scanned = self.cursor;
            return Some(line);
        }
        None
    }

    /// Bytes of unconsumed text held.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.buffer.drain(..self.cursor);
        self.scanned -= self.cursor;
        self.cursor = 0;
    }
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(tok: &mut LineTokenizer) -> Vec<String> {
        std::iter::from_fn(|| tok.next_line()).collect()
    }

    // ── Splitting ─────────────────────────────────────────────────────────────

    #[test]
    fn test_complete_lines_only_until_finish() {
        let mut tok = LineTokenizer::new(1024);
        tok.push("a,b\nc,d").unwrap();
        assert_eq!(drain(&mut tok), vec!["a,b"]);
        assert!(!tok.has_line());
        tok.finish();
        assert!(tok.has_line());
        assert_eq!(drain(&mut tok), vec!["c,d"]);
        assert_eq!(tok.pending_bytes(), 0);
    }

    #[test]
    fn test_line_split_across_pushes() {
        let mut tok = LineTokenizer::new(1024);
        tok.push("EC2,i-").unwrap();
        assert!(tok.next_line().is_none());
        tok.push("1,10.00\nS3").unwrap();
        assert_eq!(tok.next_line().as_deref(), Some("EC2,i-1,10.00"));
        tok.push(",b,1\n").unwrap();
        assert_eq!(tok.next_line().as_deref(), Some("S3,b,1"));
        assert!(tok.next_line().is_none());
    }

    #[test]
    fn test_crlf_stripped() {
        let mut tok = LineTokenizer::new(1024);
        tok.push("a\r\nb\r").unwrap();
        tok.push("\n").unwrap();
        tok.finish();
        assert_eq!(drain(&mut tok), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_lines_are_returned() {
        let mut tok = LineTokenizer::new(1024);
        tok.push("a\n\nb\n").unwrap();
        tok.finish();
        assert_eq!(drain(&mut tok), vec!["a", "", "b"]);
    }

    #[test]
    fn test_trailing_newline_yields_no_extra_line() {
        let mut tok = LineTokenizer::new(1024);
        tok.push("a\n").unwrap();
        tok.finish();
        assert_eq!(drain(&mut tok), vec!["a"]);
    }

    // ── Limits ────────────────────────────────────────────────────────────────

    #[test]
    fn test_unterminated_line_over_limit_fails() {
        let mut tok = LineTokenizer::new(8);
        tok.push("short\n").unwrap();
        tok.push("0123").unwrap();
        let err = tok.push("45678").unwrap_err();
        assert!(matches!(
            err,
            IngestError::CapacityExceeded {
                cap: CapacityKind::LineLength,
                limit: 8
            }
        ));
    }

    #[test]
    fn test_terminated_long_line_is_not_pending() {
        let mut tok = LineTokenizer::new(8);
        tok.push("0123456789abc\nok").unwrap();
        assert_eq!(tok.next_line().as_deref(), Some("0123456789abc"));
    }

    #[test]
    fn test_compaction_keeps_partial_line() {
        let mut tok = LineTokenizer::new(1024);
        tok.push("one\ntw").unwrap();
        assert_eq!(tok.next_line().as_deref(), Some("one"));
        tok.push("o\n").unwrap();
        assert_eq!(tok.pending_bytes(), 4);
        assert_eq!(tok.next_line().as_deref(), Some("two"));
    }
}
