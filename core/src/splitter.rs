//! Byte chunks in, complete lines out.
//!
//! Every emitted line carries the absolute offset of its first byte, so the
//! caller can checkpoint at any line boundary and resume later with a read
//! that starts anywhere at or before that point.

use memchr::memchr_iter;

#[derive(Debug, Default, Clone)]
pub struct StreamSplitter {
    /// Bytes of the trailing unterminated line.
    partial: Vec<u8>,
    /// Absolute file offset of `partial[0]`.
    partial_start: u64,
}

impl StreamSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A splitter whose next expected byte sits at `offset`.
    pub fn starting_at(offset: u64) -> Self {
        Self {
            partial: Vec::new(),
            partial_start: offset,
        }
    }

    /// Offset of the first byte not yet emitted as part of a complete line.
    pub fn resume_offset(&self) -> u64 {
        self.partial_start
    }

    /// Offset just past the last byte seen.
    pub fn buffered_end(&self) -> u64 {
        self.partial_start + self.partial.len() as u64
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Feed one chunk that begins at absolute offset `chunk_start`.
    ///
    /// `on_line` receives each complete line (terminator stripped) with the
    /// offset of its first byte. An error from the callback stops the scan;
    /// lines already delivered stay consumed.
    pub fn process_chunk<E>(
        &mut self,
        chunk: &[u8],
        chunk_start: u64,
        mut on_line: impl FnMut(&str, u64) -> Result<(), E>,
    ) -> Result<(), E> {
        let known_end = self.buffered_end();
        let fresh = if chunk_start < known_end {
            let overlap = (known_end - chunk_start) as usize;
            if overlap >= chunk.len() {
                return Ok(());
            }
            &chunk[overlap..]
        } else {
            if chunk_start > known_end {
                if self.has_partial() {
                    tracing::debug!(
                        dropped_bytes = self.partial.len(),
                        from = known_end,
                        to = chunk_start,
                        "Offset jump, discarding partial line"
                    );
                }
                self.partial.clear();
                self.partial_start = chunk_start;
            }
            chunk
        };

        self.partial.extend_from_slice(fresh);

        let mut consumed = 0usize;
        let mut result = Ok(());
        for newline in memchr_iter(b'\n', &self.partial) {
            let mut end = newline;
            if end > consumed && self.partial[end - 1] == b'\r' {
                end -= 1;
            }
            let text = String::from_utf8_lossy(&self.partial[consumed..end]);
            let line_start = self.partial_start + consumed as u64;
            consumed = newline + 1;
            if let Err(e) = on_line(&text, line_start) {
                result = Err(e);
                break;
            }
        }

        self.partial.drain(..consumed);
        self.partial_start += consumed as u64;
        result
    }

    /// Emit the trailing unterminated line, if any.
    pub fn flush<E>(&mut self, mut on_line: impl FnMut(&str, u64) -> Result<(), E>) -> Result<(), E> {
        if self.partial.is_empty() {
            return Ok(());
        }
        let mut end = self.partial.len();
        if self.partial[end - 1] == b'\r' {
            end -= 1;
        }
        let text = String::from_utf8_lossy(&self.partial[..end]).into_owned();
        let line_start = self.partial_start;
        self.partial_start += self.partial.len() as u64;
        self.partial.clear();
        on_line(&text, line_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn collect(splitter: &mut StreamSplitter, chunk: &[u8], start: u64, out: &mut Vec<(String, u64)>) {
        splitter
            .process_chunk::<Infallible>(chunk, start, |line, offset| {
                out.push((line.to_string(), offset));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_single_chunk_offsets() {
        let mut splitter = StreamSplitter::new();
        let mut lines = Vec::new();
        collect(&mut splitter, b"ab\ncde\r\nf", 0, &mut lines);
        assert_eq!(lines, vec![("ab".to_string(), 0), ("cde".to_string(), 3)]);
        assert_eq!(splitter.resume_offset(), 8);
        assert_eq!(splitter.buffered_end(), 9);
    }

    #[test]
    fn test_partial_line_across_chunks() {
        let mut splitter = StreamSplitter::new();
        let mut lines = Vec::new();
        collect(&mut splitter, b"hel", 0, &mut lines);
        assert!(lines.is_empty());
        collect(&mut splitter, b"lo\r", 3, &mut lines);
        assert!(lines.is_empty());
        collect(&mut splitter, b"\nx\n", 6, &mut lines);
        assert_eq!(lines, vec![("hello".to_string(), 0), ("x".to_string(), 7)]);
        assert_eq!(splitter.resume_offset(), 9);
    }

    #[test]
    fn test_overlapping_chunk_is_deduplicated() {
        let mut splitter = StreamSplitter::new();
        let mut lines = Vec::new();
        collect(&mut splitter, b"one\ntw", 0, &mut lines);
        // Re-read from the resume offset, as a live poll does.
        collect(&mut splitter, b"two\nthree\n", 4, &mut lines);
        // Fully redundant re-read.
        collect(&mut splitter, b"one\n", 0, &mut lines);
        assert_eq!(
            lines,
            vec![
                ("one".to_string(), 0),
                ("two".to_string(), 4),
                ("three".to_string(), 8)
            ]
        );
    }

    #[test]
    fn test_gap_discards_partial() {
        let mut splitter = StreamSplitter::new();
        let mut lines = Vec::new();
        collect(&mut splitter, b"lost", 0, &mut lines);
        collect(&mut splitter, b"kept\n", 100, &mut lines);
        assert_eq!(lines, vec![("kept".to_string(), 100)]);
        assert_eq!(splitter.resume_offset(), 105);
    }

    #[test]
    fn test_flush_emits_tail() {
        let mut splitter = StreamSplitter::starting_at(10);
        let mut lines = Vec::new();
        collect(&mut splitter, b"a\nb\r", 10, &mut lines);
        splitter
            .flush::<Infallible>(|line, offset| {
                lines.push((line.to_string(), offset));
                Ok(())
            })
            .unwrap();
        assert_eq!(lines, vec![("a".to_string(), 10), ("b".to_string(), 12)]);
        assert_eq!(splitter.resume_offset(), 14);
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let text = "héllo\n".as_bytes();
        let mut splitter = StreamSplitter::new();
        let mut lines = Vec::new();
        collect(&mut splitter, &text[..2], 0, &mut lines);
        collect(&mut splitter, &text[2..], 2, &mut lines);
        assert_eq!(lines, vec![("héllo".to_string(), 0)]);
    }

    #[test]
    fn test_callback_error_stops_after_current_line() {
        let mut splitter = StreamSplitter::new();
        let mut seen = Vec::new();
        let result = splitter.process_chunk(b"a\nb\nc\n", 0, |line, _| {
            seen.push(line.to_string());
            if line == "b" { Err("stop") } else { Ok(()) }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(splitter.resume_offset(), 4);
    }
}
