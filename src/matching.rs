//! Three-tier answer matching over the knowledge store.
//!
//! Tiers are tried in order and each scans every entry before the next
//! tier starts: exact match, substring containment in either direction,
//! then token overlap. The first entry hit within a tier wins.

use crate::knowledge::KnowledgeStore;
use crate::utils::normalize;

/// Tokens must be longer than this (in characters) to count as overlap.
const MIN_TOKEN_CHARS: usize = 2;
/// Shared tokens required for a tier-3 hit.
const MIN_COMMON_TOKENS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Substring,
    TokenOverlap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub tier: MatchTier,
}

/// Resolve a raw utterance to a stored answer.
pub fn find_answer<'a>(store: &'a KnowledgeStore, input: &str) -> Option<Match<'a>> {
    let input = normalize(input);
    if input.is_empty() {
        return None;
    }

    let hit = |tier: MatchTier| {
        move |(question, answer): (&'a str, &'a str)| Match {
            question,
            answer,
            tier,
        }
    };

    if let Some(m) = store.lookup(&input).map(hit(MatchTier::Exact)) {
        return Some(m);
    }

    if let Some(m) = store
        .entries()
        .find(|(key, _)| {
            !key.is_empty() && (input.contains(*key) || key.contains(input.as_str()))
        })
        .map(hit(MatchTier::Substring))
    {
        return Some(m);
    }

    let input_tokens: Vec<&str> = input.split_whitespace().collect();
    store
        .entries()
        .find(|(key, _)| common_tokens(key, &input_tokens) >= MIN_COMMON_TOKENS)
        .map(hit(MatchTier::TokenOverlap))
}

/// Shared long tokens, repeats included. Counted from both sides (key tokens
/// found in the input, input tokens found in the key); the larger count wins.
fn common_tokens(key: &str, input_tokens: &[&str]) -> usize {
    fn occurrences(from: &[&str], within: &[&str]) -> usize {
        from.iter()
            .filter(|t| t.chars().count() > MIN_TOKEN_CHARS && within.contains(*t))
            .count()
    }

    let key_tokens: Vec<&str> = key.split_whitespace().collect();
    occurrences(&key_tokens, input_tokens).max(occurrences(input_tokens, &key_tokens))
}
