//! Token counting.
//!
//! The counter must match the tokenizer the inference backend uses. When the
//! primary tokenizer fails, counting falls back to the `len / 4` heuristic and
//! never raises.

use crate::error::TokenizeError;

/// Estimate the number of tokens in a string.
///
/// Approximation: ~4 characters per token for English text, rounded up.
/// Used as the fallback for every [`TokenCounter`].
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// `count(text) -> tokens`.
pub trait TokenCounter: Send + Sync {
    fn name(&self) -> &str;

    /// Count with the primary tokenizer. May fail.
    fn try_count(&self, text: &str) -> Result<usize, TokenizeError>;

    /// Count, falling back to [`estimate_tokens`] if the primary tokenizer fails.
    fn count(&self, text: &str) -> usize {
        match self.try_count(text) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(counter = self.name(), error = %e, "Tokenizer failed, using heuristic");
                estimate_tokens(text)
            }
        }
    }
}

/// The character-length heuristic as a counter in its own right.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn try_count(&self, text: &str) -> Result<usize, TokenizeError> {
        Ok(estimate_tokens(text))
    }
}
