//! Token measurement for assembly.
//!
//! Text is counted with the injected [`TokenCounter`]; every recognised media
//! marker costs a fixed, configurable number of tokens instead of whatever the
//! counter would make of its payload.

use std::sync::Arc;
use windowpack_config::CompressionConfig;
use windowpack_core::media::MarkerScanner;
use windowpack_core::message::Message;
use windowpack_core::token::{HeuristicCounter, TokenCounter};

#[derive(Clone)]
pub struct TokenMeter {
    counter: Arc<dyn TokenCounter>,
    scanner: MarkerScanner,
    marker_tokens: usize,
}

impl TokenMeter {
    pub fn new(counter: Arc<dyn TokenCounter>, compression: &CompressionConfig) -> Self {
        Self {
            counter,
            scanner: MarkerScanner::new(&compression.media_kinds),
            marker_tokens: compression.media_marker_tokens,
        }
    }

    /// `len / 4` counting with the default marker settings.
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicCounter), &CompressionConfig::default())
    }

    /// Tokens for a piece of content, markers at their fixed cost.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let (stripped, markers) = self.scanner.extract(text);
        self.counter.count(&stripped) + markers.len() * self.marker_tokens
    }

    pub fn count_message(&self, message: &Message) -> usize {
        self.count(&message.content)
    }

    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    pub fn scanner(&self) -> &MarkerScanner {
        &self.scanner
    }

    pub fn marker_tokens(&self) -> usize {
        self.marker_tokens
    }

    pub fn counter_name(&self) -> &str {
        self.counter.name()
    }
}

impl std::fmt::Debug for TokenMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMeter")
            .field("counter", &self.counter.name())
            .field("marker_tokens", &self.marker_tokens)
            .finish()
    }
}
