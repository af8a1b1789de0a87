//! Core console components.
//!
//! - **session**: The console session controller and its event channel
//! - **process**: Child process runner with merged output
//! - **stream**: Pipe-backed virtual stdout/stdin streams
//! - **transcript**: Bounded transcript text and process status
//! - **input**: Prompt-guarded input line
//! - **prompt**: Prompt rendering
//! - **display**: Output surface trait
//!
//! # Architecture
//!
//! ```text
//! Console
//! ├── PendingInput (prompt + command text)
//! ├── CommandHistory
//! ├── ProcessRunner ──► worker thread ──┐
//! ├── VirtualStream x2 ──► drain threads ┼──► ConsoleEvent ──► pump
//! └── Transcript ◄──────────────────────────────────────────────┘
//!     └── TextCache
//! ```

pub mod display;
pub mod input;
pub mod process;
pub mod prompt;
pub mod session;
pub mod stream;
pub mod transcript;

pub use display::{Display, InputMode, NullDisplay};
pub use input::PendingInput;
pub use process::{ProcessId, ProcessRunner};
pub use prompt::{PromptIdentity, PromptStyle};
pub use session::{Console, ConsoleEvent, ConsoleState, Focused, KeyOutcome};
pub use stream::{StreamMode, VirtualStream};
pub use transcript::{ProcessStatus, TextCache, Transcript};
