//! Bounded per-server output capture.
//!
//! Readers push whole lines; the oldest lines are dropped once either the
//! line or the byte limit is exceeded.

use std::collections::VecDeque;

pub const MAX_LOG_LINES: usize = 1000;
pub const MAX_LOG_BYTES: usize = 256 * 1024;

#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    bytes: usize,
    max_lines: usize,
    max_bytes: usize,
    dropped: u64,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_limits(MAX_LOG_LINES, MAX_LOG_BYTES)
    }
}

impl LogBuffer {
    pub fn with_limits(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            max_lines: max_lines.max(1),
            max_bytes: max_bytes.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, mut line: String) {
        if line.len() > self.max_bytes {
            let mut cut = self.max_bytes;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        self.bytes += line.len();
        self.lines.push_back(line);

        while self.lines.len() > self.max_lines || self.bytes > self.max_bytes {
            match self.lines.pop_front() {
                Some(old) => {
                    self.bytes -= old.len();
                    self.dropped += 1;
                }
                None => break,
            }
        }
    }

    /// Retained output, one `\n`-terminated line per entry.
    pub fn snapshot(&self) -> String {
        let mut out = String::with_capacity(self.bytes + self.lines.len());
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_lines() {
        let mut buf = LogBuffer::with_limits(3, 1024);
        for i in 0..5 {
            buf.push(format!("line {i}"));
        }
        assert_eq!(buf.snapshot(), "line 2\nline 3\nline 4\n");
        assert_eq!(buf.dropped(), 2);
    }

    #[test]
    fn byte_limit_evicts_oldest() {
        let mut buf = LogBuffer::with_limits(100, 10);
        buf.push("aaaa".into());
        buf.push("bbbb".into());
        buf.push("cccc".into());
        assert_eq!(buf.snapshot(), "bbbb\ncccc\n");
    }

    #[test]
    fn oversized_line_is_truncated_on_char_boundary() {
        let mut buf = LogBuffer::with_limits(10, 5);
        buf.push("ééééé".into());
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.snapshot(), "éé\n");
    }

    #[test]
    fn empty_snapshot() {
        let buf = LogBuffer::default();
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), "");
    }
}
