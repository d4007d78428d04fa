//! Command history for procterm
//!
//! Keeps the commands submitted in this session and a cursor used to
//! recall them with the up/down keys. History lives in memory only.

/// Default maximum number of history entries
pub const HISTORY_LIMIT: usize = 1000;

/// Recall cursor position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Pointing at an entry
    Index(usize),
    /// Past the last entry (nothing recorded yet)
    PastEnd,
}

/// Command history storage
pub struct CommandHistory {
    /// All entries (newest last)
    entries: Vec<String>,
    /// Recall cursor
    cursor: Cursor,
    /// Maximum entries, 0 means unlimited
    max_entries: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHistory {
    /// Create a new command history
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    /// Create a history keeping at most `max_entries` commands
    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: Cursor::PastEnd,
            max_entries,
        }
    }

    /// Record a submitted command
    pub fn record(&mut self, command: &str) {
        // Skip if same as last command (dedup consecutive)
        if self.entries.last().map(String::as_str) != Some(command) {
            self.entries.push(command.to_string());

            // Trim if exceeding limit
            if self.max_entries > 0 && self.entries.len() > self.max_entries {
                let excess = self.entries.len() - self.max_entries;
                self.entries.drain(..excess);
            }
        }

        self.cursor = Cursor::Index(self.entries.len() - 1);
    }

    /// Step back one entry, clamped to the first
    pub fn recall_previous(&mut self) -> Option<&str> {
        let last = self.entries.len().checked_sub(1)?;
        let index = match self.cursor {
            Cursor::Index(i) => i.saturating_sub(1),
            Cursor::PastEnd => last,
        };
        self.set_cursor(index)
    }

    /// Step forward one entry, clamped to the last
    pub fn recall_next(&mut self) -> Option<&str> {
        let last = self.entries.len().checked_sub(1)?;
        let index = match self.cursor {
            Cursor::Index(i) => (i + 1).min(last),
            Cursor::PastEnd => last,
        };
        self.set_cursor(index)
    }

    fn set_cursor(&mut self, index: usize) -> Option<&str> {
        self.cursor = Cursor::Index(index);
        self.entries.get(index).map(String::as_str)
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Get entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
