//! Invocation grammar over classified lines.
//!
//! ```text
//! invocation := marker blank* fence-open payload* fence-close
//!             | terminal-fence-open payload* fence-close
//! marker     := "> " SENTINEL id "/do/" verb "/" (format | shell)
//! ```
//!
//! Any other fenced block is prose. Its body is skipped so that markers quoted
//! inside example code never match.

use std::collections::HashSet;

use tracing::debug;

use crate::messages::{Invocation, InvocationFormat};
use crate::parser::error::ParseError;
use crate::parser::incremental::IncrementalScanner;
use crate::parser::token::{self, LineKind, MarkerLine};
use crate::types::InvocationId;

/// Sentinel used when a deployment does not configure its own.
pub const DEFAULT_SENTINEL: &str = "@@";

/// Outcome of trying to match the grammar at one line.
#[derive(Debug)]
pub(crate) enum Step {
    /// A complete invocation; scanning resumes at the given line.
    Found(Invocation, usize),
    /// Nothing to extract; scanning resumes at the given line.
    Skip(usize),
    /// A candidate was rejected; scanning resumes at the given line.
    Drop(ParseError, usize),
    /// The candidate needs more lines before it can be decided.
    Pending,
}

/// Matches the grammar starting at `start`.
///
/// When `at_eof` is false, running out of lines yields [`Step::Pending`]
/// instead of dropping the candidate.
pub(crate) fn match_at(lines: &[&str], start: usize, sentinel: &str, at_eof: bool) -> Step {
    match token::classify(lines[start], start, sentinel) {
        LineKind::Marker(marker) => match_marked(lines, start, marker, at_eof),
        LineKind::MalformedMarker(error) => Step::Drop(error, start + 1),
        LineKind::Fence { tag } => match token::terminal_shell_for_tag(tag) {
            Some(shell) => match_bare_terminal(lines, start, shell, at_eof),
            None => skip_prose_fence(lines, start, at_eof),
        },
        LineKind::Blank | LineKind::Text => Step::Skip(start + 1),
    }
}

fn match_marked(lines: &[&str], start: usize, marker: MarkerLine, at_eof: bool) -> Step {
    let mut open = start + 1;
    while open < lines.len() && lines[open].trim().is_empty() {
        open += 1;
    }

    if open == lines.len() {
        return if at_eof {
            Step::Drop(
                ParseError::invalid_payload(start, "no fenced block follows the marker"),
                lines.len(),
            )
        } else {
            Step::Pending
        };
    }

    if !is_fence(lines[open]) {
        return Step::Drop(
            ParseError::invalid_payload(start, "marker must be followed by a fenced block"),
            open,
        );
    }

    let Some(close) = find_close(lines, open + 1) else {
        return unterminated(open, lines.len(), at_eof);
    };

    Step::Found(
        Invocation {
            id: marker.id,
            operation: marker.operation,
            format: marker.format,
            shell: marker.shell,
            request: payload(lines, open, close),
            response: None,
            start_line: start,
            end_line: close,
        },
        close + 1,
    )
}

fn match_bare_terminal(lines: &[&str], start: usize, shell: &str, at_eof: bool) -> Step {
    let Some(close) = find_close(lines, start + 1) else {
        return unterminated(start, lines.len(), at_eof);
    };

    Step::Found(
        Invocation {
            id: InvocationId::generate(),
            operation: "terminal".to_string(),
            format: InvocationFormat::Terminal,
            shell: Some(shell.to_string()),
            request: payload(lines, start, close),
            response: None,
            start_line: start,
            end_line: close,
        },
        close + 1,
    )
}

fn skip_prose_fence(lines: &[&str], start: usize, at_eof: bool) -> Step {
    match find_close(lines, start + 1) {
        Some(close) => Step::Skip(close + 1),
        None if at_eof => Step::Skip(lines.len()),
        None => Step::Pending,
    }
}

fn unterminated(open: usize, len: usize, at_eof: bool) -> Step {
    if at_eof {
        Step::Drop(
            ParseError::invalid_payload(open, "fenced block is never closed"),
            (open + 1).min(len),
        )
    } else {
        Step::Pending
    }
}

fn is_fence(line: &str) -> bool {
    line.trim().starts_with(token::FENCE)
}

fn find_close(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| lines[i].trim() == token::FENCE)
}

fn payload(lines: &[&str], open: usize, close: usize) -> String {
    lines[open + 1..close]
        .iter()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Parser
// =============================================================================

/// Scans model output for invocation blocks.
///
/// # Example
///
/// ```
/// use codeloop::parser::InvocationParser;
///
/// let parser = InvocationParser::default();
/// let text = "Let me check.\n> @@a1/do/exec/code\n```code\n1 + 1\n```\nDone.";
///
/// let invocations = parser.find_invocations(text);
/// assert_eq!(invocations.len(), 1);
/// assert_eq!(invocations[0].request, "1 + 1");
/// assert_eq!(parser.strip(text, &invocations), "Let me check.\nDone.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationParser {
    sentinel: String,
}

impl Default for InvocationParser {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

impl InvocationParser {
    /// Creates a parser that recognizes markers with the given sentinel.
    #[must_use]
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    /// Returns the configured sentinel.
    #[must_use]
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Returns every well-formed invocation in `text`, in document order.
    ///
    /// Malformed candidates are dropped individually and never stop the scan.
    #[must_use]
    pub fn find_invocations(&self, text: &str) -> Vec<Invocation> {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut found = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            match match_at(&lines, i, &self.sentinel, true) {
                Step::Found(invocation, next) => {
                    found.push(invocation);
                    i = next;
                }
                Step::Skip(next) => i = next,
                Step::Drop(error, next) => {
                    debug!(error = %error, "Dropping invocation candidate");
                    i = next;
                }
                // Unreachable at end of input, but never loop on it.
                Step::Pending => break,
            }
        }

        found
    }

    /// Parses a block that must start with a marker line.
    ///
    /// Leading blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMarker` if the first line is not a marker and
    /// `InvalidPayload` if the marker is not followed by a closed fenced block.
    pub fn parse_one(&self, block: &str) -> Result<Invocation, ParseError> {
        let lines: Vec<&str> = block.split('\n').collect();
        let first = lines
            .iter()
            .position(|line| !line.trim().is_empty())
            .ok_or_else(|| ParseError::invalid_marker(0, "block is empty"))?;

        let marker = token::parse_marker(lines[first], first, &self.sentinel)?;

        match match_marked(&lines, first, marker, true) {
            Step::Found(invocation, _) => Ok(invocation),
            Step::Drop(error, _) => Err(error),
            Step::Skip(_) | Step::Pending => Err(ParseError::invalid_payload(
                first,
                "no fenced block follows the marker",
            )),
        }
    }

    /// Removes the line ranges of `invocations` from `text` and trims the result.
    ///
    /// Overlapping ranges remove their union.
    #[must_use]
    pub fn strip(&self, text: &str, invocations: &[Invocation]) -> String {
        strip(text, invocations)
    }

    /// Creates an incremental scanner sharing this parser's sentinel.
    #[must_use]
    pub fn scanner(&self) -> IncrementalScanner {
        IncrementalScanner::new(self.clone())
    }
}

/// Removes the line ranges of `invocations` from `text` and trims the result.
#[must_use]
pub fn strip(text: &str, invocations: &[Invocation]) -> String {
    let excluded: HashSet<usize> = invocations
        .iter()
        .flat_map(|inv| inv.start_line..=inv.end_line)
        .collect();

    text.split('\n')
        .enumerate()
        .filter(|(i, _)| !excluded.contains(i))
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> InvocationParser {
        InvocationParser::default()
    }

    #[test]
    fn finds_single_invocation() {
        let text = "Calc:\n\n> @@id1/do/exec/code\n```code\n2+2\n```\n\nDone.";
        let invocations = parser().find_invocations(text);

        assert_eq!(invocations.len(), 1);
        let inv = &invocations[0];
        assert_eq!(inv.id.as_str(), "id1");
        assert_eq!(inv.operation, "exec");
        assert_eq!(inv.format, InvocationFormat::Code);
        assert_eq!(inv.request, "2+2");
        assert_eq!((inv.start_line, inv.end_line), (2, 5));
        assert!(inv.response.is_none());
    }

    #[test]
    fn finds_many_in_document_order_without_overlap() {
        let mut text = String::from("intro\n");
        for n in 0..4 {
            text.push_str(&format!(
                "> @@id{n}/do/exec/typed-code\n```\nlet x{n}: int = {n};\nx{n}\n```\nbetween\n"
            ));
        }

        let invocations = parser().find_invocations(&text);
        assert_eq!(invocations.len(), 4);
        for (n, inv) in invocations.iter().enumerate() {
            assert_eq!(inv.id.as_str(), format!("id{n}"));
            assert_eq!(inv.format, InvocationFormat::TypedCode);
            assert_eq!(inv.request, format!("let x{n}: int = {n};\nx{n}"));
        }
        for pair in invocations.windows(2) {
            assert!(pair[0].end_line < pair[1].start_line);
        }
    }

    #[test]
    fn blank_lines_between_marker_and_fence_are_allowed() {
        let text = "> @@a/do/exec/code\n\n   \n```code\n1\n```";
        let invocations = parser().find_invocations(text);
        assert_eq!(invocations.len(), 1);
        assert_eq!((invocations[0].start_line, invocations[0].end_line), (0, 5));
    }

    #[test]
    fn marker_followed_by_prose_is_dropped() {
        let text = "> @@a/do/exec/code\nnot a fence\n> @@b/do/exec/code\n```\n2\n```";
        let invocations = parser().find_invocations(text);
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].id.as_str(), "b");
    }

    #[test]
    fn unclosed_fence_is_dropped() {
        let text = "> @@a/do/exec/code\n```\n1 + 1\n";
        assert!(parser().find_invocations(text).is_empty());
    }

    #[test]
    fn malformed_marker_does_not_abort_scan() {
        let text = "> @@bad/exec/code\n```\n1\n```\n> @@good/do/exec/code\n```\n2\n```";
        let invocations = parser().find_invocations(text);
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].id.as_str(), "good");
    }

    #[test]
    fn markers_inside_prose_fences_are_ignored() {
        let text = "Example:\n```markdown\n> @@x/do/exec/code\n```\n```\n1\n```\n```";
        assert!(parser().find_invocations(text).is_empty());
    }

    #[test]
    fn terminal_marker_carries_shell() {
        let text = "> @@ls/do/terminal/zsh\n```sh\nls -la\n```";
        let inv = &parser().find_invocations(text)[0];
        assert_eq!(inv.format, InvocationFormat::Terminal);
        assert_eq!(inv.shell.as_deref(), Some("zsh"));
        assert_eq!(inv.request, "ls -la");
    }

    #[test]
    fn bare_terminal_fence_is_implicit_invocation() {
        let text = "Run this:\n```bash\necho hi\n```\nok";
        let invocations = parser().find_invocations(text);
        assert_eq!(invocations.len(), 1);

        let inv = &invocations[0];
        assert!(inv.id.is_generated());
        assert_eq!(inv.operation, "terminal");
        assert_eq!(inv.shell.as_deref(), Some("bash"));
        assert_eq!(inv.request, "echo hi");
        assert_eq!((inv.start_line, inv.end_line), (1, 3));
    }

    #[test]
    fn custom_sentinel() {
        let parser = InvocationParser::new("S ");
        let text = "Calc:\n\n> S id1/do/exec/code\n```code\n2+2\n```\n\nDone.";
        let invocations = parser.find_invocations(text);
        assert_eq!(invocations.len(), 1);
        assert!(InvocationParser::default().find_invocations(text).is_empty());
    }

    #[test]
    fn crlf_lines_are_tolerated() {
        let text = "> @@a/do/exec/code\r\n```\r\n1 + 2\r\n```\r\n";
        let invocations = parser().find_invocations(text);
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].request, "1 + 2");
    }

    #[test]
    fn parse_one_accepts_block() {
        let inv = parser()
            .parse_one("> @@q/do/exec/code\n```\nlet a = 1;\na\n```")
            .unwrap();
        assert_eq!(inv.id.as_str(), "q");
        assert_eq!(inv.request, "let a = 1;\na");
    }

    #[test]
    fn parse_one_rejects_missing_do_segment() {
        let error = parser().parse_one("> @@q/exec/code\n```\n1\n```").unwrap_err();
        assert!(error.is_invalid_marker());
    }

    #[test]
    fn parse_one_rejects_unknown_format() {
        let error = parser().parse_one("> @@q/do/exec/ruby\n```\n1\n```").unwrap_err();
        assert!(error.is_invalid_marker());
    }

    #[test]
    fn parse_one_rejects_non_marker_first_line() {
        let error = parser().parse_one("hello\n```\n1\n```").unwrap_err();
        assert!(error.is_invalid_marker());
    }

    #[test]
    fn parse_one_rejects_missing_fence() {
        let error = parser().parse_one("> @@q/do/exec/code").unwrap_err();
        assert!(error.is_invalid_payload());

        let error = parser().parse_one("> @@q/do/exec/code\n```\n1").unwrap_err();
        assert!(error.is_invalid_payload());
    }

    #[test]
    fn strip_removes_exactly_the_ranges() {
        let text = "a\n> @@1/do/exec/code\n```\nx\n```\nb\n> @@2/do/exec/code\n```\ny\n```\nc";
        let parser = parser();
        let invocations = parser.find_invocations(text);
        assert_eq!(parser.strip(text, &invocations), "a\nb\nc");
    }

    #[test]
    fn strip_without_invocations_only_trims() {
        assert_eq!(strip("\n  hello\nworld \n", &[]), "hello\nworld");
    }

    #[test]
    fn strip_overlapping_ranges_removes_union() {
        let text = "0\n1\n2\n3\n4";
        let mut a = parser().parse_one("> @@a/do/exec/code\n```\n```").unwrap();
        a.start_line = 1;
        a.end_line = 2;
        let mut b = a.clone();
        b.start_line = 2;
        b.end_line = 3;
        assert_eq!(strip(text, &[a, b]), "0\n4");
    }
}
