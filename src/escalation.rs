//! Questions forwarded to the administrator and awaiting an answer.
//!
//! Keyed by the transport id of the escalation message, so an admin reply
//! quoting that message resolves exactly one entry. Entries have no expiry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub question: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct EscalationTracker {
    pending: HashMap<String, PendingQuestion>,
}

impl EscalationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending question. The id is supplied by the transport
    /// and assumed unique; a reused id replaces the older entry.
    pub fn create(&mut self, escalation_message_id: &str, question: &str, user_id: &str) {
        self.pending.insert(
            escalation_message_id.to_string(),
            PendingQuestion {
                question: question.to_string(),
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn contains(&self, escalation_message_id: &str) -> bool {
        self.pending.contains_key(escalation_message_id)
    }

    /// Remove and return the entry, if any.
    pub fn resolve(&mut self, escalation_message_id: &str) -> Option<PendingQuestion> {
        self.pending.remove(escalation_message_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
