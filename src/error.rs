//! Error types for the console engine
//!
//! Command failures never tear down a session: the console turns them into
//! lines in the transcript. Stream errors are returned to the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Unbalanced quotes or a dangling escape in a command line
    #[error("No closing quotation")]
    CommandSyntax,

    #[error("{0}")]
    Spawn(#[source] io::Error),

    #[error("{source}")]
    DirectoryChange {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading from a stream that only accepts writes
    #[error("operation not supported on a stdin stream")]
    UnsupportedOperation,

    #[error("I/O operation on closed stream")]
    ClosedStream,

    #[error("a command is already running")]
    Busy,

    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
