//! Prompt construction

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Prompt layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// `[user@host dir]>> `
    #[default]
    Full,
    /// `[/full/path/to/dir]:`
    Path,
}

/// Identity shown in the prompt, resolved once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptIdentity {
    pub user: String,
    pub host: String,
}

impl PromptIdentity {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Read user and host from the environment
    pub fn detect() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "user".to_string());
        let host = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        Self { user, host }
    }

    /// Render the prompt for `directory`
    pub fn render(&self, style: PromptStyle, directory: &Path) -> String {
        match style {
            PromptStyle::Full => {
                let base = directory
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| directory.to_string_lossy().into_owned());
                format!("[{}@{} {}]>> ", self.user, self.host, base)
            }
            PromptStyle::Path => format!("[{}]:", directory.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_full_prompt_uses_basename() {
        let id = PromptIdentity::new("ada", "engine");
        let dir = PathBuf::from("/home/ada/notes");
        assert_eq!(id.render(PromptStyle::Full, &dir), "[ada@engine notes]>> ");
    }

    #[test]
    #[cfg(unix)]
    fn test_root_directory() {
        let id = PromptIdentity::new("root", "box");
        assert_eq!(id.render(PromptStyle::Full, Path::new("/")), "[root@box /]>> ");
        assert_eq!(id.render(PromptStyle::Path, Path::new("/")), "[/]:");
    }

    #[test]
    fn test_path_prompt() {
        let id = PromptIdentity::new("ada", "engine");
        let dir = PathBuf::from("/tmp/work");
        assert_eq!(id.render(PromptStyle::Path, &dir), "[/tmp/work]:");
    }
}
