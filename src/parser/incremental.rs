//! Incremental scanning over a growing text buffer.
//!
//! The streaming loop receives model output in arbitrary deltas. The scanner
//! only looks at complete lines, never revisits lines it has already resolved,
//! and only yields an invocation once its closing fence has arrived.

use tracing::debug;

use crate::messages::Invocation;
use crate::parser::grammar::{self, InvocationParser, Step};

/// Scans a buffer that grows one delta at a time.
#[derive(Debug, Clone)]
pub struct IncrementalScanner {
    parser: InvocationParser,
    buffer: String,
    /// First line that has not been resolved yet
    cursor_line: usize,
    /// Byte offset of `cursor_line` in `buffer`
    cursor_byte: usize,
}

impl IncrementalScanner {
    /// Creates an empty scanner.
    #[must_use]
    pub fn new(parser: InvocationParser) -> Self {
        Self {
            parser,
            buffer: String::new(),
            cursor_line: 0,
            cursor_byte: 0,
        }
    }

    /// Appends a delta and returns invocations completed by it.
    ///
    /// Line ranges are absolute within the whole buffer.
    pub fn push(&mut self, delta: &str) -> Vec<Invocation> {
        self.buffer.push_str(delta);
        if !delta.contains('\n') {
            return Vec::new();
        }
        self.scan(false)
    }

    /// Flushes the trailing unterminated line, resolving any pending candidate.
    pub fn finish(&mut self) -> Vec<Invocation> {
        self.scan(true)
    }

    /// Returns everything pushed so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Consumes the scanner and returns the accumulated text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.buffer
    }

    /// Returns the first line that is still unresolved.
    #[must_use]
    pub fn cursor_line(&self) -> usize {
        self.cursor_line
    }

    fn scan(&mut self, at_eof: bool) -> Vec<Invocation> {
        let end = if at_eof {
            self.buffer.len()
        } else {
            match self.buffer.rfind('\n') {
                Some(newline) => newline + 1,
                None => return Vec::new(),
            }
        };

        if end <= self.cursor_byte {
            return Vec::new();
        }

        let window = &self.buffer[self.cursor_byte..end];
        let mut lines: Vec<&str> = window.split('\n').collect();
        if !at_eof {
            // The window ends with '\n', which leaves an empty trailing piece.
            lines.pop();
        }

        let sentinel = self.parser.sentinel();
        let mut found = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            match grammar::match_at(&lines, i, sentinel, at_eof) {
                Step::Found(invocation, next) => {
                    found.push(invocation.shifted(self.cursor_line));
                    i = next;
                }
                Step::Skip(next) => i = next,
                Step::Drop(error, next) => {
                    debug!(
                        error = %error,
                        line = self.cursor_line + error.line,
                        "Dropping invocation candidate"
                    );
                    i = next;
                }
                Step::Pending => break,
            }
        }

        let consumed: usize = lines[..i].iter().map(|line| line.len() + 1).sum();
        self.cursor_byte = (self.cursor_byte + consumed).min(self.buffer.len());
        self.cursor_line += i;

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> IncrementalScanner {
        InvocationParser::default().scanner()
    }

    #[test]
    fn yields_only_after_closing_fence() {
        let mut scanner = scanner();
        assert!(scanner.push("Working.\n> @@a/do/exec/code\n").is_empty());
        assert!(scanner.push("```code\n40 +").is_empty());
        assert!(scanner.push(" 2\n").is_empty());

        let found = scanner.push("```\nafter");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].request, "40 + 2");
        assert_eq!((found[0].start_line, found[0].end_line), (1, 4));
        assert_eq!(scanner.cursor_line(), 5);
    }

    #[test]
    fn closing_fence_without_newline_waits_for_finish() {
        let mut scanner = scanner();
        assert!(scanner.push("> @@a/do/exec/code\n```\n1\n```").is_empty());
        let found = scanner.finish();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].end_line, 3);
    }

    #[test]
    fn resolved_lines_are_not_rescanned() {
        let mut scanner = scanner();
        let first = scanner.push("> @@a/do/exec/code\n```\n1\n```\n");
        assert_eq!(first.len(), 1);

        let second = scanner.push("> @@b/do/exec/code\n```\n2\n```\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id.as_str(), "b");
        assert_eq!((second[0].start_line, second[0].end_line), (4, 7));
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn matches_whole_text_parse_for_any_chunking() {
        let text = "Intro\n> @@x/do/exec/code\n\n```\nlet a = 1;\n```\nmid\n```bash\nls\n```\n> @@y/do/terminal/sh\n```\npwd\n```\nend";
        let expected = InvocationParser::default().find_invocations(text);

        for size in [1, 2, 3, 7, 64] {
            let mut scanner = scanner();
            let mut found = Vec::new();
            let chars: Vec<char> = text.chars().collect();
            for chunk in chars.chunks(size) {
                found.extend(scanner.push(&chunk.iter().collect::<String>()));
            }
            found.extend(scanner.finish());

            assert_eq!(found.len(), expected.len(), "chunk size {size}");
            for (got, want) in found.iter().zip(&expected) {
                assert_eq!(got.request, want.request);
                assert_eq!(got.format, want.format);
                assert_eq!((got.start_line, got.end_line), (want.start_line, want.end_line));
            }
            assert_eq!(scanner.text(), text);
        }
    }

    #[test]
    fn unclosed_block_is_dropped_on_finish() {
        let mut scanner = scanner();
        assert!(scanner.push("> @@a/do/exec/code\n```\n1\n").is_empty());
        assert!(scanner.finish().is_empty());
        assert_eq!(scanner.into_text(), "> @@a/do/exec/code\n```\n1\n");
    }
}
