//! The editable command line
//!
//! The line is `prompt + text`. The prompt is never editable, so the cursor
//! is stored relative to the start of the text and can not reach into it.
//! Positions are counted in chars.

/// Pending input line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInput {
    prompt: String,
    text: String,
    /// Cursor position within `text`, in chars
    cursor: usize,
    /// Selection anchor within `text`, in chars
    anchor: Option<usize>,
}

impl PendingInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Command text without the prompt
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Full line including the prompt
    pub fn line(&self) -> String {
        format!("{}{}", self.prompt, self.text)
    }

    /// Prompt length in chars; the left boundary for the cursor
    pub fn boundary(&self) -> usize {
        self.prompt.chars().count()
    }

    /// Cursor column in the full line
    pub fn cursor_col(&self) -> usize {
        self.boundary() + self.cursor
    }

    /// Cursor position within the command text
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn before_cursor(&self) -> &str {
        &self.text[..self.byte_at(self.cursor)]
    }

    pub fn after_cursor(&self) -> &str {
        &self.text[self.byte_at(self.cursor)..]
    }

    /// Selected command text, if any
    pub fn selection(&self) -> Option<&str> {
        let (start, end) = self.selection_range()?;
        Some(&self.text[self.byte_at(start)..self.byte_at(end)])
    }

    /// Reset to an empty line under a (possibly new) prompt
    pub fn reset(&mut self, prompt: &str) {
        self.prompt.clear();
        self.prompt.push_str(prompt);
        self.text.clear();
        self.cursor = 0;
        self.anchor = None;
    }

    /// Replace the command text and place the cursor at `cursor`
    /// (clamped to the text length). Tabs are dropped.
    pub fn set_text(&mut self, text: &str, cursor: usize) {
        self.text = strip_tabs(text);
        self.cursor = cursor.min(self.len());
        self.anchor = None;
    }

    /// Place the cursor at a column of the full line, clamped to the prompt
    pub fn set_cursor_col(&mut self, col: usize) {
        self.cursor = col.saturating_sub(self.boundary()).min(self.len());
        self.anchor = None;
    }

    pub fn insert_char(&mut self, ch: char) {
        if ch == '\t' {
            return;
        }
        self.delete_selection();
        let at = self.byte_at(self.cursor);
        self.text.insert(at, ch);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        let s = strip_tabs(s);
        if s.is_empty() {
            return;
        }
        self.delete_selection();
        let at = self.byte_at(self.cursor);
        self.text.insert_str(at, &s);
        self.cursor += s.chars().count();
    }

    /// Backspace. Returns false at the prompt boundary.
    pub fn delete_left(&mut self) -> bool {
        if self.delete_selection() {
            return true;
        }
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let at = self.byte_at(self.cursor);
        self.text.remove(at);
        true
    }

    pub fn delete_right(&mut self) -> bool {
        if self.delete_selection() {
            return true;
        }
        if self.cursor >= self.len() {
            return false;
        }
        let at = self.byte_at(self.cursor);
        self.text.remove(at);
        true
    }

    /// Returns false at the prompt boundary
    pub fn move_left(&mut self) -> bool {
        self.anchor = None;
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn move_right(&mut self) -> bool {
        self.anchor = None;
        if self.cursor >= self.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Move to the first column after the prompt. With `select`, the text
    /// between there and the old cursor becomes the selection.
    pub fn home(&mut self, select: bool) {
        self.anchor = if select && self.cursor > 0 {
            Some(self.anchor.unwrap_or(self.cursor))
        } else {
            None
        };
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.anchor = None;
        self.cursor = self.len();
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn selection_range(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        if anchor == self.cursor {
            return None;
        }
        Some((anchor.min(self.cursor), anchor.max(self.cursor)))
    }

    fn delete_selection(&mut self) -> bool {
        let Some((start, end)) = self.selection_range() else {
            self.anchor = None;
            return false;
        };
        let (from, to) = (self.byte_at(start), self.byte_at(end));
        self.text.replace_range(from..to, "");
        self.cursor = start;
        self.anchor = None;
        true
    }

    fn byte_at(&self, char_idx: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}

fn strip_tabs(s: &str) -> String {
    s.chars().filter(|&c| c != '\t').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_never_enters_prompt() {
        let mut input = PendingInput::new("[x]:");
        assert!(!input.delete_left());
        assert!(!input.move_left());
        assert_eq!(input.cursor_col(), 4);

        input.insert_str("ls");
        input.set_cursor_col(1);
        assert_eq!(input.cursor_col(), 4);
        assert_eq!(input.line(), "[x]:ls");
    }

    #[test]
    fn test_tabs_are_never_kept() {
        let mut input = PendingInput::new("> ");
        input.insert_char('\t');
        input.insert_str("a\tb");
        assert_eq!(input.text(), "ab");
        input.set_text("c\td", 10);
        assert_eq!(input.text(), "cd");
        assert_eq!(input.cursor(), 2);
    }

    #[test]
    fn test_multibyte_editing() {
        let mut input = PendingInput::new("» ");
        input.insert_str("héllo");
        input.move_left();
        input.move_left();
        assert_eq!(input.before_cursor(), "hél");
        assert_eq!(input.after_cursor(), "lo");
        input.delete_left();
        input.delete_left();
        assert_eq!(input.text(), "hlo");
        assert_eq!(input.cursor_col(), 3);
    }

    #[test]
    fn test_shift_home_selects_to_boundary() {
        let mut input = PendingInput::new("$ ");
        input.insert_str("echo hi");
        input.move_left();
        input.move_left();
        input.home(true);
        assert_eq!(input.selection(), Some("echo "));
        input.delete_left();
        assert_eq!(input.text(), "hi");
        assert_eq!(input.cursor(), 0);
        assert_eq!(input.selection(), None);
    }

    #[test]
    fn test_reset_with_new_prompt() {
        let mut input = PendingInput::new("[a]:");
        input.insert_str("cd b");
        input.reset("[a/b]:");
        assert_eq!(input.line(), "[a/b]:");
        assert_eq!(input.cursor_col(), 6);
    }
}
