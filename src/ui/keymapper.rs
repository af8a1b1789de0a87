//! Key mapping for console input
//!
//! Converts key events to the console's logical editing actions.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::core::display::InputMode;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Logical editing action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    /// Previous (older) history entry
    HistoryUp,
    /// Next (newer) history entry, or back to the live line
    HistoryNext,
    /// Older history entry starting with the text before the cursor
    SearchPrev,
    /// Newer history entry starting with the text before the cursor
    SearchNext,
    /// Tab completion
    Complete,
    /// Jump to the first command column, optionally selecting
    LineHome { select: bool },
    LineEnd,
    DeleteLeft,
    DeleteRight,
    CursorLeft,
    CursorRight,
    Insert(char),
    Submit,
    /// Ctrl+C
    Interrupt,
    /// Ctrl+\
    Kill,
}

/// Key mapper for converting key events to editing actions
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent for the given input field.
    ///
    /// History, search and completion keys only exist on the command line.
    pub fn map(event: &KeyEvent, mode: InputMode) -> Option<EditAction> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let mods = Modifiers::from(event.modifiers);
        let command = mode == InputMode::Command;

        match event.code {
            KeyCode::Char(ch) if mods.contains(Modifiers::CTRL) => Self::map_ctrl(ch),
            KeyCode::Char(_) if mods.contains(Modifiers::ALT) => None,
            KeyCode::Char(ch) => Some(EditAction::Insert(ch)),

            KeyCode::Enter => Some(EditAction::Submit),
            KeyCode::Backspace => Some(EditAction::DeleteLeft),
            KeyCode::Delete => Some(EditAction::DeleteRight),
            KeyCode::Left => Some(EditAction::CursorLeft),
            KeyCode::Right => Some(EditAction::CursorRight),
            KeyCode::Home => Some(EditAction::LineHome {
                select: mods.contains(Modifiers::SHIFT),
            }),
            KeyCode::End => Some(EditAction::LineEnd),

            KeyCode::Tab if command => Some(EditAction::Complete),
            KeyCode::Up if command => Some(EditAction::HistoryUp),
            KeyCode::Down if command => Some(EditAction::HistoryNext),
            KeyCode::PageUp if command => Some(EditAction::SearchPrev),
            KeyCode::PageDown if command => Some(EditAction::SearchNext),

            _ => None,
        }
    }

    fn map_ctrl(ch: char) -> Option<EditAction> {
        match ch.to_ascii_lowercase() {
            'c' => Some(EditAction::Interrupt),
            // Terminals report Ctrl+\ as either form
            '\\' | '4' => Some(EditAction::Kill),
            'a' => Some(EditAction::LineHome { select: false }),
            'e' => Some(EditAction::LineEnd),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_char_keys() {
        let event = key_event(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(
            KeyMapper::map(&event, InputMode::Command),
            Some(EditAction::Insert('a'))
        );

        let event = key_event(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(
            KeyMapper::map(&event, InputMode::Interact),
            Some(EditAction::Insert('A'))
        );

        let event = key_event(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(KeyMapper::map(&event, InputMode::Command), None);
    }

    #[test]
    fn test_control_keys() {
        let event = key_event(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(
            KeyMapper::map(&event, InputMode::Interact),
            Some(EditAction::Interrupt)
        );

        let event = key_event(KeyCode::Char('\\'), KeyModifiers::CONTROL);
        assert_eq!(
            KeyMapper::map(&event, InputMode::Interact),
            Some(EditAction::Kill)
        );

        let event = key_event(KeyCode::Char('z'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event, InputMode::Command), None);
    }

    #[test]
    fn test_command_only_keys() {
        let cases = [
            (KeyCode::Tab, EditAction::Complete),
            (KeyCode::Up, EditAction::HistoryUp),
            (KeyCode::Down, EditAction::HistoryNext),
            (KeyCode::PageUp, EditAction::SearchPrev),
            (KeyCode::PageDown, EditAction::SearchNext),
        ];
        for (code, action) in cases {
            let event = key_event(code, KeyModifiers::NONE);
            assert_eq!(KeyMapper::map(&event, InputMode::Command), Some(action));
            assert_eq!(KeyMapper::map(&event, InputMode::Interact), None);
        }
    }

    #[test]
    fn test_shift_home_selects() {
        let event = key_event(KeyCode::Home, KeyModifiers::SHIFT);
        assert_eq!(
            KeyMapper::map(&event, InputMode::Command),
            Some(EditAction::LineHome { select: true })
        );
        let event = key_event(KeyCode::Home, KeyModifiers::NONE);
        assert_eq!(
            KeyMapper::map(&event, InputMode::Command),
            Some(EditAction::LineHome { select: false })
        );
    }

    #[test]
    fn test_release_is_ignored() {
        let event = KeyEvent::new_with_kind_and_state(
            KeyCode::Enter,
            KeyModifiers::NONE,
            KeyEventKind::Release,
            KeyEventState::NONE,
        );
        assert_eq!(KeyMapper::map(&event, InputMode::Command), None);
    }
}
