//! Results tracking.
//!
//! Successful invocation responses are coerced into JSON values, stored by
//! invocation id, and kept in a bounded history whose tail is surfaced into
//! later system prompts.

mod coerce;
mod store;

pub use coerce::{coerce, DisplayLanguage};
pub use store::{ExecutionHistoryEntry, ResultsTracker, HISTORY_CAPACITY, PROMPT_HISTORY};
