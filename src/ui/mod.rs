//! User interface rendering and input handling.
//!
//! - **keymapper**: Keyboard input to console editing actions
//! - **renderer**: Full-screen crossterm renderer for the console

pub mod keymapper;
pub mod renderer;

pub use keymapper::*;
pub use renderer::*;
