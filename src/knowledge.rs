//! Knowledge store: question → answer mapping persisted as a JSON snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::{PersistError, UpsertError};
use crate::utils::{normalize, write_json_snapshot};

pub struct KnowledgeStore {
    path: PathBuf,
    /// Keys are stored normalized (trimmed, lowercased).
    entries: BTreeMap<String, String>,
}

impl KnowledgeStore {
    /// Load the knowledge file, creating an empty one if it does not exist.
    ///
    /// A file that exists but cannot be parsed is an error: silently starting
    /// empty would overwrite it on the next upsert.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if !path.exists() {
            let store = Self {
                path,
                entries: BTreeMap::new(),
            };
            store.persist()?;
            info!(path = %store.path.display(), "Created empty knowledge base");
            return Ok(store);
        }

        let content = std::fs::read_to_string(&path)?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content)?;
        let mut entries = BTreeMap::new();
        for (question, answer) in raw {
            let key = normalize(&question);
            if key.is_empty() {
                warn!("Skipping knowledge entry with blank question");
                continue;
            }
            entries.insert(key, answer);
        }
        info!(path = %path.display(), entries = entries.len(), "Knowledge base loaded");
        Ok(Self { path, entries })
    }

    /// In-memory store that persists to `path` but does not read it.
    #[cfg(test)]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact, case-insensitive, whitespace-trimmed lookup. Returns the stored
    /// (normalized) question with its answer.
    pub fn lookup(&self, question: &str) -> Option<(&str, &str)> {
        self.entries
            .get_key_value(&normalize(question))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Answer text only.
    #[cfg(test)]
    pub fn answer(&self, question: &str) -> Option<&str> {
        self.lookup(question).map(|(_, answer)| answer)
    }

    /// Iterate `(normalized question, answer)` pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert or overwrite an entry and rewrite the snapshot.
    ///
    /// On `UpsertError::Persist` the entry is still present in memory.
    pub fn upsert(&mut self, question: &str, answer: &str) -> Result<(), UpsertError> {
        let key = normalize(question);
        let answer = answer.trim();
        if key.is_empty() || answer.is_empty() {
            return Err(UpsertError::Blank);
        }
        self.entries.insert(key, answer.to_string());
        self.persist()?;
        Ok(())
    }

    fn persist(&self) -> Result<(), PersistError> {
        write_json_snapshot(&self.path, &self.entries)
    }
}
