//! Context window assembly.
//!
//! Every provider call sees the system prompt, a window of recent memory,
//! and the pending input, in that order.

use std::fmt::Write as _;

use crate::messages::{MemoryEntry, Message};
use crate::tracker::ExecutionHistoryEntry;

/// Default number of memory entries replayed into each request.
pub const DEFAULT_MEMORY_WINDOW: usize = 10;

/// Longest result preview shown in the prompt history.
const RESULT_PREVIEW_CHARS: usize = 200;

/// Returns the instructions that teach the model the marker syntax.
#[must_use]
pub fn marker_instructions(sentinel: &str) -> String {
    format!(
        "You can execute code. Write a marker line followed by a fenced block:\n\
         \n\
         > {sentinel}<id>/do/exec/code\n\
         ```\n\
         <script>\n\
         ```\n\
         \n\
         Use `typed-code` in place of `code` for typed script with annotations. \
         To run a shell command write `> {sentinel}<id>/do/terminal/<shell>` before the block. \
         Give every block a short id that is unique in your reply. \
         Variables persist between blocks. Results come back in the next message."
    )
}

/// Builds the system prompt.
///
/// `history` is rendered in the order given, which callers keep oldest first.
#[must_use]
pub fn system_prompt<'a>(
    base: &str,
    sentinel: &str,
    history: impl IntoIterator<Item = &'a ExecutionHistoryEntry>,
) -> String {
    let mut prompt = String::new();
    if !base.trim().is_empty() {
        prompt.push_str(base.trim_end());
        prompt.push_str("\n\n");
    }
    prompt.push_str(&marker_instructions(sentinel));

    let mut history = history.into_iter().peekable();
    if history.peek().is_some() {
        prompt.push_str("\n\nRecent results:");
        for entry in history {
            let code = entry.code.lines().next().unwrap_or_default();
            let _ = write!(
                prompt,
                "\n- {} ({}): {} => {}",
                entry.id,
                entry.format,
                code,
                preview(&entry.result.to_string())
            );
        }
    }
    prompt
}

fn preview(text: &str) -> String {
    if text.chars().count() <= RESULT_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(RESULT_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Renders a memory entry as a provider message.
///
/// An invocation with a successful response becomes a user message pairing
/// the code with its result. Anything else is replayed as a tool message.
#[must_use]
pub fn render_entry(entry: &MemoryEntry) -> Message {
    match entry {
        MemoryEntry::Message(message) => message.clone(),
        MemoryEntry::Invocation(invocation) => match invocation.successful_response() {
            Some(response) => Message::user(format!(
                "code: {}\nresult: {}",
                invocation.request, response
            )),
            None => Message::tool(format!(
                "[{} {}]\n{}\n{}",
                invocation.format,
                invocation.id,
                invocation.request,
                invocation.response.as_deref().unwrap_or_default()
            )),
        },
    }
}

/// Assembles the messages for one provider call.
#[must_use]
pub fn build_context(system: String, window: &[MemoryEntry], input: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(Message::system(system));
    messages.extend(window.iter().map(render_entry));
    messages.push(Message::user(input));
    messages
}
