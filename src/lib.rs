//! rconsole - an embeddable interactive command console
//!
//! A [`Console`] shows a prompt, runs one command at a time with its output
//! streamed into a bounded transcript, keeps a command history with prefix
//! search, completes file names, and exposes pipe-backed virtual stdout and
//! stdin streams so other code can print into the console or submit
//! commands to it.
//!
//! ```no_run
//! use std::time::Duration;
//! use rconsole::{Console, ConsoleConfig, NullDisplay};
//!
//! let mut console = Console::new(ConsoleConfig::default(), NullDisplay)?;
//! let line = format!("{}echo hello", console.prompt());
//! console.on_submit(&line);
//! console.wait_idle(Duration::from_secs(5));
//! assert!(console.text().contains("hello\n"));
//! # Ok::<(), rconsole::ConsoleError>(())
//! ```

pub mod completion;
pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod ui;

pub use crate::completion::Completion;
pub use crate::config::ConsoleConfig;
pub use crate::core::{
    Console, ConsoleEvent, ConsoleState, Display, Focused, InputMode, KeyOutcome, NullDisplay,
    ProcessStatus, PromptIdentity, PromptStyle, StreamMode, VirtualStream,
};
pub use crate::error::{ConsoleError, Result};
pub use crate::history::{CommandHistory, SearchDirection};
