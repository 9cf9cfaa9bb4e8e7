//! Shared test doubles for allocator, trimmer and compressor tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use windowpack_config::CompressionConfig;
use windowpack_core::error::{KnowledgeError, ProviderError, TokenizeError};
use windowpack_core::knowledge::KnowledgeSource;
use windowpack_core::provider::Summarizer;
use windowpack_core::token::{TokenCounter, estimate_tokens};

use crate::compressor::OverflowCompressor;
use crate::meter::TokenMeter;

/// A heuristic-metered compressor with default settings.
pub fn compressor(summarizer: Option<Arc<dyn Summarizer>>) -> OverflowCompressor {
    compressor_with(CompressionConfig::default(), summarizer)
}

pub fn compressor_with(
    config: CompressionConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
) -> OverflowCompressor {
    let meter = TokenMeter::new(Arc::new(windowpack_core::HeuristicCounter), &config);
    let c = OverflowCompressor::new(meter, config).unwrap();
    match summarizer {
        Some(s) => c.with_summarizer(s),
        None => c,
    }
}

/// Like [`compressor`], counting through `counter`.
pub fn compressor_counting(
    counter: Arc<CountingCounter>,
    summarizer: Option<Arc<dyn Summarizer>>,
) -> OverflowCompressor {
    let config = CompressionConfig::default();
    let meter = TokenMeter::new(counter, &config);
    let c = OverflowCompressor::new(meter, config).unwrap();
    match summarizer {
        Some(s) => c.with_summarizer(s),
        None => c,
    }
}

// ── Counting ──────────────────────────────────────────────────────────────

/// Heuristic counts, recording every text it is asked to count.
#[derive(Default)]
pub struct CountingCounter {
    seen: Mutex<Vec<String>>,
}

impl CountingCounter {
    pub fn times_counted(&self, text: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|t| *t == text).count()
    }
}

impl TokenCounter for CountingCounter {
    fn name(&self) -> &str {
        "counting"
    }

    fn try_count(&self, text: &str) -> Result<usize, TokenizeError> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(estimate_tokens(text))
    }
}

// ── Knowledge ─────────────────────────────────────────────────────────────

/// Returns the first `k` of a fixed ranked list and records every `k` asked for.
pub struct RankedKnowledge {
    snippets: Vec<String>,
    requested: Mutex<Vec<usize>>,
    queries: Mutex<Vec<String>>,
}

impl RankedKnowledge {
    pub fn new(snippets: Vec<String>) -> Self {
        Self {
            snippets,
            requested: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// `count` snippets of `chars` characters each.
    pub fn uniform(count: usize, chars: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| format!("{i:02}{}", "m".repeat(chars.saturating_sub(2))))
                .collect(),
        )
    }

    pub fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl KnowledgeSource for RankedKnowledge {
    fn name(&self) -> &str {
        "ranked"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, KnowledgeError> {
        self.requested.lock().unwrap().push(k);
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.snippets.iter().take(k).cloned().collect())
    }
}

pub struct FailingKnowledge;

#[async_trait::async_trait]
impl KnowledgeSource for FailingKnowledge {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, KnowledgeError> {
        Err(KnowledgeError::QueryFailed("index offline".into()))
    }
}

/// Records everything passed to `remember`.
#[derive(Default)]
pub struct RecordingKnowledge {
    remembered: Mutex<Vec<String>>,
}

impl RecordingKnowledge {
    pub fn remembered(&self) -> Vec<String> {
        self.remembered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl KnowledgeSource for RecordingKnowledge {
    fn name(&self) -> &str {
        "recording"
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, KnowledgeError> {
        Ok(Vec::new())
    }

    async fn remember(&self, text: &str) -> Result<bool, KnowledgeError> {
        let mut remembered = self.remembered.lock().unwrap();
        if remembered.iter().any(|r| r == text) {
            return Ok(false);
        }
        remembered.push(text.to_string());
        Ok(true)
    }
}

// ── Summarizers ───────────────────────────────────────────────────────────

/// Always answers with the same summary.
pub struct FixedSummarizer {
    summary: String,
    calls: Mutex<usize>,
    last_input_chars: Mutex<Option<usize>>,
    last_max_tokens: Mutex<Option<usize>>,
}

impl FixedSummarizer {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            calls: Mutex::new(0),
            last_input_chars: Mutex::new(None),
            last_max_tokens: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn last_input_chars(&self) -> Option<usize> {
        *self.last_input_chars.lock().unwrap()
    }

    pub fn last_max_tokens(&self) -> Option<usize> {
        *self.last_max_tokens.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Summarizer for FixedSummarizer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn summarize(&self, text: &str, max_output_tokens: usize) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        *self.last_input_chars.lock().unwrap() = Some(text.chars().count());
        *self.last_max_tokens.lock().unwrap() = Some(max_output_tokens);
        Ok(self.summary.clone())
    }
}

#[derive(Default)]
pub struct FailingSummarizer {
    calls: Mutex<usize>,
}

impl FailingSummarizer {
    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Summarizer for FailingSummarizer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn summarize(&self, _text: &str, _max: usize) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        Err(ProviderError::ApiError {
            status_code: 500,
            message: "internal error".into(),
        })
    }
}

/// Sleeps past any reasonable deadline before answering.
pub struct SlowSummarizer {
    delay: Duration,
}

impl SlowSummarizer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl Summarizer for SlowSummarizer {
    fn name(&self) -> &str {
        "slow"
    }

    async fn summarize(&self, _text: &str, _max: usize) -> Result<String, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok("late summary".into())
    }
}
