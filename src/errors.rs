//! Error taxonomy for the message-handling engine.
//!
//! Every error is handled where it occurs; none of these abort the process.

use std::path::PathBuf;

use thiserror::Error;

/// Failure writing a knowledge or history snapshot to disk.
///
/// The in-memory effect of the operation that triggered the write has
/// already been applied when this is returned.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Rejection from `KnowledgeStore::upsert`.
#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("question and answer must both be non-empty")]
    Blank,
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors reported by a transport collaborator.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("transport initialization failed: {0}")]
    Init(String),
    /// A message could not be delivered (reply, escalation, lookup).
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl TransportError {
    pub fn message(&self) -> String {
        match self {
            TransportError::Init(m) | TransportError::Delivery(m) => m.clone(),
        }
    }

    /// True when the failure carries one of the configured signatures of a
    /// corrupted local session.
    pub fn is_corruption(&self, signatures: &[String]) -> bool {
        is_corruption_message(&self.message(), signatures)
    }
}

/// Signature check shared by init failures and asynchronous transport errors.
pub fn is_corruption_message(message: &str, signatures: &[String]) -> bool {
    signatures
        .iter()
        .any(|sig| !sig.is_empty() && message.contains(sig.as_str()))
}

/// Session-data purge failure after all attempts, including the fallback.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("failed to remove {path} after {attempts} attempts: {source}")]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// User-visible failures of administrator and teach commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("sender {0} is not the administrator")]
    Unauthorized(String),
    #[error("malformed teach command")]
    Malformed,
}
