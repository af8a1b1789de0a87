//! Display collaborator
//!
//! The console pushes its whole transcript to a [`Display`]. Redraws are
//! rate limited by the console, so implementations can redraw unconditionally.

/// Which input field is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Command line with prompt
    Command,
    /// Interaction line forwarding to the running process, plus kill control
    Interact,
}

/// Passive output surface
pub trait Display {
    /// Receive the full transcript text
    fn render(&mut self, text: &str);

    /// Scroll to the newest line
    fn scroll_to_end(&mut self) {}

    /// The console swapped its input field
    fn set_input_mode(&mut self, mode: InputMode) {
        let _ = mode;
    }
}

/// Display that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn render(&mut self, _text: &str) {}
}
