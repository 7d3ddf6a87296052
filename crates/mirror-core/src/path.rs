//! Sync-root relative path handling.
//!
//! Peers exchange paths like `/notes/a.txt`. Every lookup key (debounce,
//! echo guard) and every filesystem join goes through [`normalize_path`] so
//! that `/notes/a.txt`, `notes/a.txt` and `notes//a.txt` are the same entry.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty or refers to the sync root itself")]
    Empty,

    #[error("path escapes the sync root: {0}")]
    EscapesRoot(String),
}

/// Normalize a relative path into its canonical `a/b/c` key form.
///
/// Only `/` separates components; a backslash is an ordinary file name
/// character. Empty and `.` components are dropped. Any `..` component is
/// rejected.
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(PathError::EscapesRoot(path.to_string())),
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts.join("/"))
}

/// Lenient key form used for map lookups, where a bad path just never matches.
pub(crate) fn path_key(path: &str) -> String {
    normalize_path(path).unwrap_or_else(|_| path.to_string())
}

/// Key forms of every proper ancestor of `path`, nearest first.
///
/// `a/b/c.txt` yields `a/b` then `a`. Invalid paths have no ancestors.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let Ok(normalized) = normalize_path(path) else {
        return Vec::new();
    };
    let mut ancestors = Vec::new();
    let mut current = normalized.as_str();
    while let Some((parent, _)) = current.rsplit_once('/') {
        ancestors.push(parent.to_string());
        current = parent;
    }
    ancestors
}

/// Wire form of a normalized relative path (leading `/`).
pub fn wire_path(relative: &str) -> String {
    format!("/{}", relative.trim_start_matches('/'))
}
