//! Configuration for rconsole.
//!
//! The configuration file lives at `~/.rconsole/config.toml`. Every key is
//! optional:
//!
//! ```toml
//! # Lines of output kept in the transcript
//! cached_history_lines = 200
//!
//! # Commands remembered for Up/Down and PageUp/PageDown search
//! cached_commands_limit = 90
//!
//! # Display only
//! font = "DroidSansMono"
//! font_size = 9
//!
//! # Route commands through `sh -c` / `cmd /C` instead of word splitting.
//! # This lets the shell expand globs, pipes and variables, and also lets it
//! # run anything the user types. Leave off unless you need it.
//! use_shell_interpreter = false
//!
//! # "full" => "[user@host dir]>> ", "path" => "[/full/path]:"
//! prompt_style = "full"
//!
//! # Minimum delay between two display refreshes
//! refresh_interval_ms = 100
//!
//! # Offer executables from PATH when completing the first word
//! complete_from_path = true
//!
//! # Directory the session starts in (defaults to the process cwd)
//! # start_directory = "/home/me/projects"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::prompt::PromptStyle;
use crate::error::{ConsoleError, Result};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Maximum number of transcript lines retained
    pub cached_history_lines: usize,
    /// Maximum number of remembered commands
    pub cached_commands_limit: usize,
    /// Font name, passed through to the display
    pub font: String,
    /// Font size, passed through to the display
    pub font_size: u16,
    /// Run commands through the platform shell
    pub use_shell_interpreter: bool,
    /// Prompt layout
    pub prompt_style: PromptStyle,
    /// Display refresh rate limit in milliseconds
    pub refresh_interval_ms: u64,
    /// Include PATH executables in first-word completion
    pub complete_from_path: bool,
    /// Initial working directory
    pub start_directory: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            cached_history_lines: 200,
            cached_commands_limit: 90,
            font: "DroidSansMono".to_string(),
            font_size: 9,
            use_shell_interpreter: false,
            prompt_style: PromptStyle::Full,
            refresh_interval_ms: 100,
            complete_from_path: true,
            start_directory: None,
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!("Ignoring config file: {}", e),
                }
            }
        }
        Self::default()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConsoleError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content).map_err(|message| ConsoleError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Get config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".rconsole").join("config.toml"))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.cached_history_lines, 200);
        assert_eq!(config.cached_commands_limit, 90);
        assert!(!config.use_shell_interpreter);
        assert_eq!(config.prompt_style, PromptStyle::Full);
        assert_eq!(config.refresh_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ConsoleConfig::parse(
            "cached_commands_limit = 10\nprompt_style = \"path\"\n",
        )
        .unwrap();
        assert_eq!(config.cached_commands_limit, 10);
        assert_eq!(config.prompt_style, PromptStyle::Path);
        assert_eq!(config.cached_history_lines, 200);
        assert_eq!(config.font_size, 9);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cached_history_lines = \"lots\"").unwrap();

        match ConsoleConfig::load_from(&path) {
            Err(ConsoleError::Config { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
