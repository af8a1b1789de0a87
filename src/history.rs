//! Command history for rconsole
//!
//! Bounded log of accepted commands with Up/Down navigation and
//! PageUp/PageDown prefix search. History lives only as long as the session.

use std::collections::VecDeque;

/// Direction of a prefix search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchDirection {
    /// Toward older entries
    Older,
    /// Toward newer entries
    Newer,
}

/// Command history storage
///
/// The cursor ranges over `0..=len`; `len` is the live edit line.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    /// All entries (newest last)
    entries: VecDeque<String>,
    /// Navigation cursor
    cursor: usize,
    /// Maximum entries
    max_entries: usize,
}

impl CommandHistory {
    /// Create a new command history holding at most `max_entries` commands
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            cursor: 0,
            max_entries,
        }
    }

    /// Add a command to history
    pub fn append(&mut self, command: &str) {
        self.cursor = self.entries.len();

        if command.is_empty() || self.max_entries == 0 {
            return;
        }

        // Skip if same as last command (dedup consecutive)
        if self.entries.back().map(String::as_str) == Some(command) {
            return;
        }

        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(command.to_string());
        self.cursor = self.entries.len();
    }

    /// Step to the previous (older) entry.
    ///
    /// Returns `None` when already at the oldest entry or history is empty.
    pub fn previous(&mut self) -> Option<&str> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Step to the next (newer) entry.
    ///
    /// Returns `None` once the cursor reaches the live edit line.
    pub fn next(&mut self) -> Option<&str> {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            self.entries.get(self.cursor).map(String::as_str)
        } else {
            self.cursor = self.entries.len();
            None
        }
    }

    /// Find the nearest entry starting with `prefix`, moving away from the
    /// cursor in `direction`. The scan stops at the ends of the log.
    ///
    /// When nothing matches the cursor stays on the last index visited:
    /// `0` for [`SearchDirection::Older`], `len - 1` for
    /// [`SearchDirection::Newer`].
    pub fn search_prefix(&mut self, direction: SearchDirection, prefix: &str) -> Option<&str> {
        let len = self.entries.len();
        if len == 0 {
            self.cursor = 0;
            return None;
        }

        loop {
            match direction {
                SearchDirection::Older => {
                    if self.cursor == 0 {
                        return None;
                    }
                    self.cursor -= 1;
                }
                SearchDirection::Newer => {
                    if self.cursor + 1 >= len {
                        self.cursor = len - 1;
                        return None;
                    }
                    self.cursor += 1;
                }
            }
            if self.entries[self.cursor].starts_with(prefix) {
                return Some(self.entries[self.cursor].as_str());
            }
        }
    }

    /// Move the cursor back to the live edit line
    pub fn reset_cursor(&mut self) {
        self.cursor = self.entries.len();
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(commands: &[&str]) -> CommandHistory {
        let mut history = CommandHistory::new(90);
        for cmd in commands {
            history.append(cmd);
        }
        history
    }

    #[test]
    fn test_consecutive_duplicates_dropped() {
        let history = history_of(&["ls", "ls", "pwd", "ls", "ls", ""]);
        let entries: Vec<_> = history.entries().collect();
        assert_eq!(entries, vec!["ls", "pwd", "ls"]);
        assert_eq!(history.cursor(), 3);
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut history = CommandHistory::new(3);
        for i in 0..10 {
            history.append(&format!("cmd{}", i));
            assert!(history.len() <= 3);
        }
        let entries: Vec<_> = history.entries().collect();
        assert_eq!(entries, vec!["cmd7", "cmd8", "cmd9"]);

        let mut none = CommandHistory::new(0);
        none.append("ls");
        assert!(none.is_empty());
    }

    #[test]
    fn test_navigation_boundaries() {
        let mut history = history_of(&["a", "b", "c"]);

        assert_eq!(history.previous(), Some("c"));
        assert_eq!(history.previous(), Some("b"));
        assert_eq!(history.previous(), Some("a"));
        assert_eq!(history.previous(), None);
        assert_eq!(history.cursor(), 0);

        assert_eq!(history.next(), Some("b"));
        assert_eq!(history.next(), Some("c"));
        assert_eq!(history.next(), None);
        assert_eq!(history.cursor(), 3);
        assert_eq!(history.next(), None);
        assert_eq!(history.cursor(), 3);
    }

    #[test]
    fn test_next_from_oldest_reaches_live_after_len_calls() {
        let mut history = history_of(&["a", "b", "c", "d"]);
        while history.previous().is_some() {}
        assert_eq!(history.cursor(), 0);

        let mut calls = 0;
        loop {
            calls += 1;
            if history.next().is_none() {
                break;
            }
        }
        assert_eq!(calls, history.len());
        assert_eq!(history.cursor(), history.len());
    }

    #[test]
    fn test_prefix_search_older() {
        let mut history = history_of(&["ls -l", "ls -a", "pwd"]);
        assert_eq!(history.search_prefix(SearchDirection::Older, "ls"), Some("ls -a"));
        assert_eq!(history.search_prefix(SearchDirection::Older, "ls"), Some("ls -l"));
        assert_eq!(history.search_prefix(SearchDirection::Older, "ls"), None);
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn test_prefix_search_newer_clamps_to_last_index() {
        let mut history = history_of(&["ls -l", "pwd", "ls -a", "make"]);
        while history.previous().is_some() {}

        assert_eq!(history.search_prefix(SearchDirection::Newer, "ls"), Some("ls -a"));
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.search_prefix(SearchDirection::Newer, "ls"), None);
        assert_eq!(history.cursor(), 3);
    }

    #[test]
    fn test_prefix_search_empty_history() {
        let mut history = CommandHistory::new(5);
        assert_eq!(history.search_prefix(SearchDirection::Older, "x"), None);
        assert_eq!(history.search_prefix(SearchDirection::Newer, "x"), None);
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn test_append_resets_cursor() {
        let mut history = history_of(&["a", "b"]);
        history.previous();
        history.previous();
        history.append("b");
        assert_eq!(history.cursor(), 2);
        history.previous();
        history.append("c");
        assert_eq!(history.cursor(), 3);
    }
}
