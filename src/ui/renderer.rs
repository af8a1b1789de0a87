//! Terminal renderer using crossterm
//!
//! Draws the console transcript above a one-row input line.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::core::display::{Display, InputMode};

/// Tab stop used when drawing directory listings
const TAB_WIDTH: usize = 8;

/// Hint shown on the input row while a command runs
const INTERACT_HINT: &str = " [Ctrl+C interrupt | Ctrl+\\ kill]";

/// Terminal renderer
pub struct Renderer {
    /// Latest transcript pushed by the console
    text: String,
    mode: InputMode,
    /// Transcript changed since the last draw
    dirty: bool,
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            mode: InputMode::Command,
            dirty: true,
            initialized: false,
        }
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All)
        )?;
        stdout.flush()?;
        self.initialized = true;
        self.dirty = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show);
        let _ = execute!(stdout, EnableLineWrap);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();

        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub fn needs_redraw(&self) -> bool {
        self.dirty
    }

    /// Force a full redraw on the next frame (e.g. after a resize)
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Draw the transcript and the input row. `cursor_col` is in chars.
    pub fn draw(&mut self, input: &str, cursor_col: usize) -> io::Result<()> {
        let (cols, rows) = Self::size()?;
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        let cols = cols as usize;
        let body_rows = rows as usize - 1;

        let stdout = io::stdout();
        let mut stdout = io::BufWriter::with_capacity(65536, stdout.lock());
        queue!(stdout, Hide)?;

        let lines = visible_lines(&self.text, body_rows);
        for row in 0..body_rows {
            let line = lines.get(row).map(|l| fit_width(l, cols)).unwrap_or_default();
            queue!(
                stdout,
                MoveTo(0, row as u16),
                Clear(ClearType::CurrentLine),
                Print(line)
            )?;
        }

        let input_row = rows - 1;
        let mut bottom = fit_width(input, cols);
        if self.mode == InputMode::Interact {
            let used = display_width(&bottom);
            if used + INTERACT_HINT.len() <= cols {
                bottom.push_str(&" ".repeat(cols - used - INTERACT_HINT.len()));
                bottom.push_str(INTERACT_HINT);
            }
        }
        let before_cursor: String = input.chars().take(cursor_col).collect();
        let cursor_x = display_width(&before_cursor).min(cols.saturating_sub(1));

        queue!(
            stdout,
            MoveTo(0, input_row),
            Clear(ClearType::CurrentLine),
            Print(bottom),
            MoveTo(cursor_x as u16, input_row),
            Show
        )?;
        stdout.flush()?;
        self.dirty = false;
        Ok(())
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Display for Renderer {
    fn render(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.dirty = true;
    }

    fn set_input_mode(&mut self, mode: InputMode) {
        self.mode = mode;
        self.dirty = true;
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// The last `rows` lines of `text`, tabs expanded
fn visible_lines(text: &str, rows: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(rows);
    lines[start..].iter().map(|l| expand_tabs(l)).collect()
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = TAB_WIDTH - col % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(pad));
            col += pad;
        } else {
            out.push(ch);
            col += ch.width().unwrap_or(0);
        }
    }
    out
}

/// Truncate `line` to at most `cols` terminal columns
fn fit_width(line: &str, cols: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in line.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > cols {
            break;
        }
        out.push(ch);
        used += w;
    }
    out
}

fn display_width(s: &str) -> usize {
    s.chars().map(|c| c.width().unwrap_or(0)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_lines_keeps_tail() {
        let lines = visible_lines("a\nb\nc\n", 2);
        assert_eq!(lines, vec!["b", "c"]);
        assert_eq!(visible_lines("a\n", 5), vec!["a"]);
    }

    #[test]
    fn test_expand_tabs() {
        assert_eq!(expand_tabs("a\tb"), format!("a{}b", " ".repeat(7)));
        assert_eq!(expand_tabs("\t"), " ".repeat(8));
    }

    #[test]
    fn test_fit_width_respects_wide_chars() {
        assert_eq!(fit_width("hello", 3), "hel");
        // Each CJK char takes two columns
        assert_eq!(fit_width("日本語", 5), "日本");
        assert_eq!(display_width("日本"), 4);
    }

    #[test]
    fn test_display_marks_dirty() {
        let mut renderer = Renderer::new();
        renderer.dirty = false;
        renderer.render("text");
        assert!(renderer.needs_redraw());

        renderer.dirty = false;
        renderer.set_input_mode(InputMode::Interact);
        assert!(renderer.needs_redraw());
        assert_eq!(renderer.mode(), InputMode::Interact);
    }
}
