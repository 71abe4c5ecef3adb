// Human-facing discovery log
//
// Starts out holding a single placeholder line. The first real record
// replaces it; every later record goes on top (most recent first).

use std::collections::VecDeque;

/// Placeholder shown before anything has happened
pub const DEFAULT_PLACEHOLDER: &str = "No data received";

/// Separator between entries in a snapshot
pub const ENTRY_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct DiscoveryLog {
    entries: VecDeque<String>,
    is_placeholder: bool,
    /// Bumped on every record
    revision: u64,
}

impl DiscoveryLog {
    pub fn new() -> Self {
        Self::with_placeholder(DEFAULT_PLACEHOLDER)
    }

    pub fn with_placeholder(placeholder: impl Into<String>) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(placeholder.into());
        Self {
            entries,
            is_placeholder: true,
            revision: 0,
        }
    }

    /// Record an event
    pub fn record(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.is_placeholder {
            self.entries.clear();
            self.is_placeholder = false;
        }
        self.entries.push_front(text);
        self.revision += 1;
    }

    /// Full display text, most recent entry first
    pub fn snapshot(&self) -> String {
        self.entries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR)
    }

    /// Entries, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }

    /// Changes whenever the snapshot does, without building it
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl Default for DiscoveryLog {
    fn default() -> Self {
        Self::new()
    }
}
