//! Results store with bounded execution history.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::messages::{InvocationFormat, FAILURE_SENTINEL};
use crate::tracker::coerce::coerce;
use crate::types::InvocationId;

/// Maximum history entries retained.
pub const HISTORY_CAPACITY: usize = 50;

/// History entries surfaced into the system prompt.
pub const PROMPT_HISTORY: usize = 5;

/// One successful execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    /// Invocation that produced the result
    pub id: InvocationId,
    /// The executed payload
    pub code: String,
    /// The coerced result
    pub result: Value,
    /// Payload format
    pub format: InvocationFormat,
    /// When the result was recorded
    pub timestamp: DateTime<Utc>,
}

/// Tracks coerced results of successful invocations.
///
/// Lives as long as one orchestrator. Failures are never stored so later
/// prompts are not seeded with invalid state.
#[derive(Debug, Clone)]
pub struct ResultsTracker {
    results: HashMap<InvocationId, Value>,
    history: VecDeque<ExecutionHistoryEntry>,
    capacity: usize,
}

impl Default for ResultsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Creates an empty tracker with a custom history capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: HashMap::new(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a raw response.
    ///
    /// Returns the stored value, or `None` if the response was a failure.
    pub fn record(
        &mut self,
        id: InvocationId,
        code: impl Into<String>,
        format: InvocationFormat,
        raw: &str,
    ) -> Option<&Value> {
        if raw.starts_with(FAILURE_SENTINEL) {
            debug!(id = %id, "Failure response not recorded");
            return None;
        }

        let value = coerce(raw);

        if self.capacity > 0 {
            while self.history.len() >= self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(ExecutionHistoryEntry {
                id: id.clone(),
                code: code.into(),
                result: value.clone(),
                format,
                timestamp: Utc::now(),
            });
        }

        self.results.insert(id.clone(), value);
        self.results.get(&id)
    }

    /// Returns the value recorded for `id`.
    #[must_use]
    pub fn get(&self, id: &InvocationId) -> Option<&Value> {
        self.results.get(id)
    }

    /// Returns true if a value was recorded for `id`.
    #[must_use]
    pub fn has(&self, id: &InvocationId) -> bool {
        self.results.contains_key(id)
    }

    /// Returns the full history, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<ExecutionHistoryEntry> {
        &self.history
    }

    /// Returns up to `n` most recent entries, oldest first.
    pub fn recent_history(&self, n: usize) -> impl Iterator<Item = &ExecutionHistoryEntry> {
        self.history.iter().skip(self.history.len().saturating_sub(n))
    }

    /// Returns the number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Drops every result and history entry.
    pub fn clear(&mut self) {
        self.results.clear();
        self.history.clear();
    }
}
