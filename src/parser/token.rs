//! Line tokenizer for the invocation grammar.
//!
//! Every line of model output is classified exactly once into a [`LineKind`].
//! The grammar in [`super::grammar`] only ever looks at these tokens, never at
//! raw text.

use crate::messages::InvocationFormat;
use crate::parser::error::ParseError;
use crate::types::InvocationId;

/// The three-backtick fence delimiter.
pub(crate) const FENCE: &str = "```";

/// Separator between the id and the verb in a marker line.
const DO_SEGMENT: &str = "/do/";

/// Verb that selects a shell invocation.
const TERMINAL_VERB: &str = "terminal";

/// Fence tags accepted as implicit terminal invocations.
const TERMINAL_TAGS: &[&str] = &["bash", "sh", "shell", "zsh", "terminal", "console"];

/// A fully parsed marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLine {
    /// Invocation id
    pub id: InvocationId,
    /// Verb between `/do/` and the format
    pub operation: String,
    /// Payload format
    pub format: InvocationFormat,
    /// Shell name for terminal markers
    pub shell: Option<String>,
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// A well-formed marker line
    Marker(MarkerLine),
    /// A line that starts like a marker but breaks the grammar
    MalformedMarker(ParseError),
    /// A fence line, with its (possibly empty) language tag
    Fence {
        /// Language tag after the backticks
        tag: &'a str,
    },
    /// Whitespace only
    Blank,
    /// Anything else
    Text,
}

impl LineKind<'_> {
    /// Returns true for a fence that can close a block (no tag).
    #[must_use]
    pub fn is_closing_fence(&self) -> bool {
        matches!(self, Self::Fence { tag } if tag.is_empty())
    }
}

/// Classifies one line of text.
pub(crate) fn classify<'a>(line: &'a str, line_no: usize, sentinel: &str) -> LineKind<'a> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    if let Some(tag) = trimmed.strip_prefix(FENCE) {
        return LineKind::Fence { tag: tag.trim() };
    }

    if looks_like_marker(trimmed, sentinel) {
        return match parse_marker(trimmed, line_no, sentinel) {
            Ok(marker) => LineKind::Marker(marker),
            Err(error) => LineKind::MalformedMarker(error),
        };
    }

    LineKind::Text
}

/// Returns true if the line opens with `"> "` followed by the sentinel.
fn looks_like_marker(trimmed: &str, sentinel: &str) -> bool {
    trimmed
        .strip_prefix("> ")
        .is_some_and(|rest| rest.starts_with(sentinel))
}

/// Parses a marker line: `"> " SENTINEL id "/do/" verb "/" tail`.
pub(crate) fn parse_marker(
    line: &str,
    line_no: usize,
    sentinel: &str,
) -> Result<MarkerLine, ParseError> {
    let trimmed = line.trim();

    let rest = trimmed
        .strip_prefix("> ")
        .ok_or_else(|| ParseError::invalid_marker(line_no, "marker must start with '> '"))?;

    let rest = rest.strip_prefix(sentinel).ok_or_else(|| {
        ParseError::invalid_marker(line_no, format!("expected sentinel '{sentinel}'"))
    })?;

    let (raw_id, action) = rest
        .split_once(DO_SEGMENT)
        .ok_or_else(|| ParseError::invalid_marker(line_no, "missing /do/ segment"))?;

    let id = InvocationId::parse(raw_id)
        .map_err(|e| ParseError::invalid_marker(line_no, e.to_string()))?;

    let (verb, tail) = action
        .split_once('/')
        .ok_or_else(|| ParseError::invalid_marker(line_no, "missing format after verb"))?;

    let verb = verb.trim();
    let tail = tail.trim();

    if verb.is_empty() {
        return Err(ParseError::invalid_marker(line_no, "empty verb"));
    }

    if verb == TERMINAL_VERB {
        if tail.is_empty() || tail.contains(char::is_whitespace) || tail.contains('/') {
            return Err(ParseError::invalid_marker(
                line_no,
                format!("invalid shell name '{tail}'"),
            ));
        }

        return Ok(MarkerLine {
            id,
            operation: TERMINAL_VERB.to_string(),
            format: InvocationFormat::Terminal,
            shell: Some(tail.to_string()),
        });
    }

    let format = InvocationFormat::from_marker(tail).ok_or_else(|| {
        ParseError::invalid_marker(line_no, format!("unrecognized format '{tail}'"))
    })?;

    Ok(MarkerLine {
        id,
        operation: verb.to_string(),
        format,
        shell: None,
    })
}

/// Maps a fence tag to the shell an implicit terminal invocation runs in.
///
/// Returns `None` for tags that are not shell languages.
#[must_use]
pub(crate) fn terminal_shell_for_tag(tag: &str) -> Option<&'static str> {
    let tag = tag.to_ascii_lowercase();
    if !TERMINAL_TAGS.contains(&tag.as_str()) {
        return None;
    }

    Some(match tag.as_str() {
        "bash" => "bash",
        "zsh" => "zsh",
        _ => "sh",
    })
}
