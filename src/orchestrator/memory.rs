//! Append-only conversation memory.

use std::fmt;
use std::sync::Arc;

use crate::messages::{MemoryEntry, Message};

/// Callback invoked with every appended entry.
pub type MemoryObserver = Arc<dyn Fn(&MemoryEntry) + Send + Sync>;

/// Ordered conversation memory.
///
/// `append` is the only mutation besides [`reset`](Memory::reset), and it
/// notifies the observer, if any, with the entry it stored.
#[derive(Clone, Default)]
pub struct Memory {
    entries: Vec<MemoryEntry>,
    observer: Option<MemoryObserver>,
    seed: Option<Message>,
}

impl Memory {
    /// Creates empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: MemoryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Seeds memory with a system message that survives [`reset`](Memory::reset).
    ///
    /// The seed is stored immediately; the observer is not told about it.
    #[must_use]
    pub fn with_seed(mut self, content: impl Into<String>) -> Self {
        let seed = Message::system(content);
        self.entries = vec![MemoryEntry::Message(seed.clone())];
        self.seed = Some(seed);
        self
    }

    /// Appends an entry and notifies the observer.
    pub fn append(&mut self, entry: impl Into<MemoryEntry>) {
        let entry = entry.into();
        if let Some(observer) = &self.observer {
            observer(&entry);
        }
        self.entries.push(entry);
    }

    /// Returns every entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Returns the last `n` entries, oldest first.
    #[must_use]
    pub fn window(&self, n: usize) -> &[MemoryEntry] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if memory holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry, keeping only the seed message if one was set.
    pub fn reset(&mut self) {
        self.entries.clear();
        if let Some(seed) = &self.seed {
            self.entries.push(MemoryEntry::Message(seed.clone()));
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("entries", &self.entries.len())
            .field("observer", &self.observer.is_some())
            .field("seed", &self.seed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn append_notifies_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut memory = Memory::new().with_observer(Arc::new(move |entry: &MemoryEntry| {
            sink.lock().unwrap().push(entry.clone());
        }));

        memory.append(Message::user("hi"));
        memory.append(Message::assistant("hello"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], MemoryEntry::Message(Message::assistant("hello")));
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn window_returns_tail() {
        let mut memory = Memory::new();
        for i in 0..5 {
            memory.append(Message::user(i.to_string()));
        }

        let window = memory.window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0], MemoryEntry::Message(Message::user("3")));
        assert_eq!(memory.window(10).len(), 5);
        assert!(memory.window(0).is_empty());
    }

    #[test]
    fn reset_without_seed_empties() {
        let mut memory = Memory::new();
        memory.append(Message::user("x"));
        memory.reset();
        assert!(memory.is_empty());
    }

    #[test]
    fn reset_keeps_exactly_the_seed() {
        let mut memory = Memory::new().with_seed("you are terse");
        memory.append(Message::user("x"));
        memory.append(Message::assistant("y"));
        memory.reset();

        assert_eq!(
            memory.entries(),
            &[MemoryEntry::Message(Message::system("you are terse"))]
        );
    }
}
