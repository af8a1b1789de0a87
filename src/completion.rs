//! Tab completion
//!
//! Works on the command text before and after the cursor:
//!
//! - nothing typed, or a space before the cursor: list the current directory
//! - a path separator before the cursor: list that directory
//! - `.` before the cursor: turn `.`/`..` into `./`/`../`
//! - otherwise: complete the file name prefix, or show the candidates
//!
//! Completion never touches the console itself; it returns a [`Completion`]
//! that the console applies.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{is_separator, Path, PathBuf, MAIN_SEPARATOR};

/// Outcome of a completion request
#[derive(Debug)]
pub enum Completion {
    /// Show the entries of a directory
    Listing {
        directory: PathBuf,
        entries: Vec<String>,
    },
    /// Several names match the prefix; show them
    Candidates {
        directory: PathBuf,
        names: Vec<String>,
    },
    /// Insert this text at the cursor
    Insert(String),
    /// The directory to list or search could not be read
    Unreadable { directory: PathBuf, error: io::Error },
    /// Nothing to do
    Nothing,
}

impl Completion {
    /// Text to append to the transcript, if this outcome is shown rather
    /// than applied to the input line
    pub fn display_text(&self) -> Option<String> {
        match self {
            Completion::Listing { directory, entries } => Some(format!(
                "contents of directory: {}\n{}\n",
                directory.display(),
                entries.join("\t")
            )),
            Completion::Candidates { directory, names } => Some(format!(
                "contents of directory: {}\n{}\n",
                directory.display(),
                names.join(" ")
            )),
            Completion::Unreadable { directory, error } => {
                Some(format!("{} < {} >\n", error, directory.display()))
            }
            Completion::Insert(_) | Completion::Nothing => None,
        }
    }
}

/// Complete the word before the cursor.
///
/// `search_path` is a `PATH`-style list; when given, executables on it are
/// offered while completing the first word of the line.
pub fn complete(cwd: &Path, before: &str, after: &str, search_path: Option<&OsStr>) -> Completion {
    let last = match before.chars().last() {
        None | Some(' ') => return list(cwd.to_path_buf()),
        Some(ch) => ch,
    };

    let word_start = before.rfind(' ').map(|i| i + 1).unwrap_or(0);
    let word = &before[word_start..];

    if is_separator(last) {
        return list(cwd.join(word));
    }

    if last == '.' {
        if after.starts_with(is_separator) {
            return Completion::Nothing;
        }
        return Completion::Insert(MAIN_SEPARATOR.to_string());
    }

    let (dir_part, prefix) = match word.rfind(is_separator) {
        Some(i) => (&word[..=i], &word[i + 1..]),
        None => ("", word),
    };
    let directory = if dir_part.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(dir_part)
    };

    let mut names = match matching_entries(&directory, prefix) {
        Ok(names) => names,
        Err(error) => return Completion::Unreadable { directory, error },
    };
    if word_start == 0 && dir_part.is_empty() {
        if let Some(search_path) = search_path {
            names.extend(path_commands(search_path, prefix));
            names.sort();
            names.dedup();
        }
    }

    match names.as_slice() {
        [] => Completion::Nothing,
        [name] => {
            let mut insert = name[prefix.len()..].to_string();
            // Trust the filesystem, not the text around the cursor
            if directory.join(name).is_dir() && !after.starts_with(is_separator) {
                insert.push(MAIN_SEPARATOR);
            }
            Completion::Insert(insert)
        }
        _ => Completion::Candidates { directory, names },
    }
}

fn list(directory: PathBuf) -> Completion {
    match matching_entries(&directory, "") {
        Ok(entries) => Completion::Listing { directory, entries },
        Err(error) => Completion::Unreadable { directory, error },
    }
}

/// Sorted names in `directory` starting with `prefix`
fn matching_entries(directory: &Path, prefix: &str) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(directory)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Executables on `search_path` starting with `prefix`
fn path_commands(search_path: &OsStr, prefix: &str) -> Vec<String> {
    let mut names = Vec::new();
    for dir in std::env::split_paths(search_path) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) && is_executable(&entry.path()) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn sep() -> String {
        MAIN_SEPARATOR.to_string()
    }

    #[test]
    fn test_unique_file_match() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("report.txt")).unwrap();

        match complete(dir.path(), "cat rep", "", None) {
            Completion::Insert(text) => assert_eq!(text, "ort.txt"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unique_directory_gets_separator() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sources")).unwrap();

        match complete(dir.path(), "cd sou", "", None) {
            Completion::Insert(text) => assert_eq!(text, format!("rces{}", sep())),
            other => panic!("unexpected {other:?}"),
        }
        // A separator already after the cursor is not doubled
        match complete(dir.path(), "cd sou", &sep(), None) {
            Completion::Insert(text) => assert_eq!(text, "rces"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_several_matches_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("alpha")).unwrap();
        File::create(dir.path().join("alps")).unwrap();
        File::create(dir.path().join("beta")).unwrap();

        let completion = complete(dir.path(), "vi al", "", None);
        match &completion {
            Completion::Candidates { names, .. } => assert_eq!(names, &["alpha", "alps"]),
            other => panic!("unexpected {other:?}"),
        }
        let text = completion.display_text().unwrap();
        assert!(text.starts_with("contents of directory: "));
        assert!(text.ends_with("alpha alps\n"));
    }

    #[test]
    fn test_no_match_has_no_effect() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("alpha")).unwrap();
        let completion = complete(dir.path(), "cat zz", "", None);
        assert!(matches!(completion, Completion::Nothing));
        assert!(completion.display_text().is_none());
    }

    #[test]
    fn test_empty_or_space_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("b")).unwrap();
        File::create(dir.path().join("a")).unwrap();

        for before in ["", "ls "] {
            match complete(dir.path(), before, "", None) {
                Completion::Listing { directory, entries } => {
                    assert_eq!(directory, dir.path());
                    assert_eq!(entries, vec!["a", "b"]);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        let text = complete(dir.path(), "", "", None).display_text().unwrap();
        assert!(text.ends_with("a\tb\n"));
    }

    #[test]
    fn test_trailing_separator_lists_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        File::create(dir.path().join("src").join("main.rs")).unwrap();

        match complete(dir.path(), &format!("ls src{}", sep()), "", None) {
            Completion::Listing { entries, .. } => assert_eq!(entries, vec!["main.rs"]),
            other => panic!("unexpected {other:?}"),
        }
        match complete(dir.path(), &format!("cat src{}ma", sep()), "", None) {
            Completion::Insert(text) => assert_eq!(text, "in.rs"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dot_gets_separator() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            complete(dir.path(), "cd ..", "", None),
            Completion::Insert(ref s) if *s == sep()
        ));
        assert!(matches!(
            complete(dir.path(), "cd .", &sep(), None),
            Completion::Nothing
        ));
    }

    #[test]
    fn test_missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let completion = complete(dir.path(), &format!("ls nope{}", sep()), "", None);
        assert!(matches!(completion, Completion::Unreadable { .. }));
        assert!(completion.display_text().unwrap().contains(" < "));
    }

    #[test]
    #[cfg(unix)]
    fn test_first_word_uses_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let cwd = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let tool = bin.path().join("frobnicate");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(bin.path().join("frobnotes"), "not executable").unwrap();

        let search = bin.path().as_os_str();
        match complete(cwd.path(), "frob", "", Some(search)) {
            Completion::Insert(text) => assert_eq!(text, "nicate"),
            other => panic!("unexpected {other:?}"),
        }
        // Arguments are completed from the directory only
        assert!(matches!(
            complete(cwd.path(), "x frob", "", Some(search)),
            Completion::Nothing
        ));
    }
}
