//! Random token sources
//!
//! Every CLI invocation is tagged with a correlation token drawn from a
//! [`RandomSource`]. Live runs use genuine entropy; replay runs use a strictly
//! increasing counter so that tokens embedded in recorded fixtures are
//! reproduced exactly on every run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of correlation tokens and generated identifiers
pub trait RandomSource: Send + Sync + std::fmt::Debug {
    /// Produce the next token
    fn next_token(&self) -> String;
}

/// Shared handle to a random source
pub type SharedRandom = Arc<dyn RandomSource>;

/// Counter-backed source: yields "1", "2", "3", ...
#[derive(Debug, Default)]
pub struct DeterministicRandom {
    current: AtomicU64,
}

impl DeterministicRandom {
    /// Create a source whose first token is "1"
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens handed out so far
    pub fn issued(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl RandomSource for DeterministicRandom {
    fn next_token(&self) -> String {
        (self.current.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

/// Entropy-backed source used for live runs
#[derive(Debug, Default)]
pub struct EntropyRandom;

impl RandomSource for EntropyRandom {
    fn next_token(&self) -> String {
        format!("{:016x}", fastrand::u64(..))
    }
}

/// Generate a resource identifier from a prefix and the next token
pub fn generate_id(random: &dyn RandomSource, prefix: &str) -> String {
    format!("{}{}", prefix, random.next_token())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_sequence_starts_at_one() {
        let random = DeterministicRandom::new();
        assert_eq!(random.next_token(), "1");
        assert_eq!(random.next_token(), "2");
        assert_eq!(random.next_token(), "3");
        assert_eq!(random.issued(), 3);
    }

    #[test]
    fn test_fresh_sources_are_independent() {
        let first = DeterministicRandom::new();
        first.next_token();
        first.next_token();

        let second = DeterministicRandom::new();
        assert_eq!(second.next_token(), "1");
    }

    #[test]
    fn test_entropy_tokens_are_hex() {
        let token = EntropyRandom.next_token();
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_uses_prefix() {
        let random = DeterministicRandom::new();
        assert_eq!(generate_id(&random, "clitestvm"), "clitestvm1");
    }
}
