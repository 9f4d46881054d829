//! Per-user bounded conversation transcript.
//!
//! Append-only: entries are never read back by the matcher. The whole map is
//! snapshotted to disk on a timer and at shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::PersistError;
use crate::utils::write_json_snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
    users: HashMap<String, Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Load the history file. A missing file is created empty; an unreadable
    /// one is logged and replaced by an empty transcript.
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let users = if path.exists() {
            match read_snapshot(&path) {
                Ok(users) => users,
                Err(e) => {
                    warn!(path = %path.display(), "Failed to load chat history: {}", e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let store = Self { path, limit, users };
        if !store.path.exists() {
            if let Err(e) = store.flush() {
                warn!("Failed to create chat history file: {}", e);
            }
        }
        info!(
            path = %store.path.display(),
            users = store.users.len(),
            "Chat history loaded"
        );
        store
    }

    #[cfg(test)]
    pub fn empty(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
            users: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped entry, keeping only the most recent `limit`.
    pub fn append(&mut self, user_id: &str, text: &str, is_user: bool) -> &[HistoryEntry] {
        let entries = self.users.entry(user_id.to_string()).or_default();
        entries.push(HistoryEntry {
            role: if is_user { Role::User } else { Role::Assistant },
            content: text.to_string(),
            timestamp: Utc::now(),
        });
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }
        entries
    }

    #[cfg(test)]
    pub fn get(&self, user_id: &str) -> &[HistoryEntry] {
        self.users.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Write the full per-user map to disk.
    pub fn flush(&self) -> Result<(), PersistError> {
        write_json_snapshot(&self.path, &self.users)
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<HashMap<String, Vec<HistoryEntry>>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_caps_at_limit_keeping_latest() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut history = HistoryStore::empty(dir.path().join("h.json"), 20);

        for i in 0..25 {
            history.append("alice", &format!("msg {}", i), true);
        }

        let entries = history.get("alice");
        assert_eq!(entries.len(), 20);
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        let expected: Vec<String> = (5..25).map(|i| format!("msg {}", i)).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn append_records_role_and_is_per_user() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut history = HistoryStore::empty(dir.path().join("h.json"), 20);

        history.append("alice", "hi", true);
        let seq = history.append("alice", "hello!", false);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].role, Role::User);
        assert_eq!(seq[1].role, Role::Assistant);

        assert!(history.get("bob").is_empty());
    }

    #[test]
    fn flush_then_load_restores_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("h.json");
        let mut history = HistoryStore::empty(&path, 20);
        history.append("alice", "question", true);
        history.flush().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"role\": \"user\""));

        let reloaded = HistoryStore::load(&path, 20);
        assert_eq!(reloaded.get("alice").len(), 1);
        assert_eq!(reloaded.get("alice")[0].content, "question");
    }

    #[test]
    fn load_creates_missing_file_and_survives_corruption() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("h.json");

        let history = HistoryStore::load(&path, 20);
        assert!(path.exists());
        assert!(history.get("anyone").is_empty());

        std::fs::write(&path, "{ broken").unwrap();
        let history = HistoryStore::load(&path, 20);
        assert!(history.get("anyone").is_empty());
    }
}
