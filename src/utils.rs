//! Common utility functions used across the codebase.

use std::path::Path;

use serde::Serialize;

use crate::errors::PersistError;

/// Canonical form used for knowledge keys and user input: trimmed and lowercased.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Truncates a string to at most `max_chars` characters, adding "..." if truncated.
///
/// UTF-8 safe: counts characters, not bytes. Used for log previews of
/// user messages.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    const SUFFIX: &str = "...";
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= SUFFIX.len() {
        return SUFFIX.chars().take(max_chars).collect();
    }
    let truncated: String = s.chars().take(max_chars - SUFFIX.len()).collect();
    format!("{}{}", truncated, SUFFIX)
}

/// Serialize `value` as pretty JSON and replace `path` with it.
///
/// Writes a sibling `.tmp` file first and renames it over the target so a
/// crash mid-write never leaves a truncated snapshot behind.
pub fn write_json_snapshot<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(value)?;
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Opening HOURS \n"), "opening hours");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("🦀🦀🦀🦀🦀", 4), "🦀...");
        assert_eq!(truncate_str("hello", 2), "..");
    }

    #[test]
    fn snapshot_replaces_file_and_leaves_no_tmp() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("kb.json");

        write_json_snapshot(&path, &serde_json::json!({"a": "1"})).unwrap();
        write_json_snapshot(&path, &serde_json::json!({"b": "2"})).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"b\""));
        assert!(!content.contains("\"a\""));
        assert!(!dir.path().join("nested").join("kb.json.tmp").exists());
    }
}
