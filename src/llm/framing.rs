//! Line framing for streamed response bodies.
//!
//! Network chunks split wherever the transport pleases: inside a JSON object,
//! or inside a multi-byte UTF-8 sequence. [`LineFramer`] buffers raw bytes and
//! only decodes complete lines, so both server-sent events and NDJSON can be
//! parsed one whole line at a time.

use crate::llm::error::LLMError;

/// Splits a byte stream into complete text lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    ///
    /// Returned lines carry no terminator; a trailing `\r` is removed.
    ///
    /// # Errors
    ///
    /// Returns a stream error if a complete line is not valid UTF-8.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, LLMError> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1])?);
        }
        Ok(lines)
    }

    /// Returns the unterminated tail, if any, and empties the buffer.
    ///
    /// # Errors
    ///
    /// Returns a stream error if the tail is not valid UTF-8.
    pub fn finish(&mut self) -> Result<Option<String>, LLMError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = decode_line(&rest)?;
        Ok((!line.trim().is_empty()).then_some(line))
    }
}

fn decode_line(bytes: &[u8]) -> Result<String, LLMError> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| LLMError::stream_error(format!("invalid UTF-8 in stream: {e}")))
}

// =============================================================================
// Server-sent events
// =============================================================================

/// A decoded server-sent event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// A `data:` payload
    Data(&'a str),
    /// The `[DONE]` terminator
    Done,
    /// A blank line, comment, or non-data field
    Skip,
}

/// Classifies one SSE line.
#[must_use]
pub fn sse_line(line: &str) -> SseLine<'_> {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
    match data {
        "[DONE]" => SseLine::Done,
        "" => SseLine::Skip,
        payload => SseLine::Data(payload),
    }
}

/// Parses one NDJSON line, skipping blanks.
///
/// # Errors
///
/// Returns a parse error if a non-blank line is not a JSON value.
pub fn ndjson_line(line: &str) -> Result<Option<serde_json::Value>, LLMError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| LLMError::parse_error(format!("invalid NDJSON line: {e}")))
}
