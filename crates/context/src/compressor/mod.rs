//! Overflow compression — shrink content to a token ceiling.
//!
//! A fixed cascade; each stage runs only if the previous one's output still
//! exceeds the ceiling:
//!
//! 1. **Media reduction**: keep the first N markers, note the rest
//! 2. **Summarization**: one deadline-bounded call to the injected
//!    [`Summarizer`]; any failure falls through
//! 3. **Fact extraction**: pattern categories, or a short excerpt
//! 4. **Hard truncation**: cut to the ceiling's character budget and mark it
//!
//! Content already within the ceiling is returned unchanged, which makes
//! compression idempotent.

pub mod facts;
pub mod media;

pub use facts::FactExtractor;
pub use media::MediaSplit;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use windowpack_config::CompressionConfig;
use windowpack_core::error::Result;
use windowpack_core::provider::Summarizer;

use crate::meter::TokenMeter;

/// Appended to hard-truncated content.
pub const TRUNCATION_MARKER: &str = "(truncated)";

/// Which stage produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStage {
    Unchanged,
    Media,
    Summary,
    Facts,
    Truncated,
}

impl std::fmt::Display for CompressionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Media => "media",
            Self::Summary => "summary",
            Self::Facts => "facts",
            Self::Truncated => "truncated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionOutcome {
    pub text: String,
    pub stage: CompressionStage,
    /// Markers removed by the media stage.
    pub media_dropped: usize,
    pub original_tokens: usize,
    pub final_tokens: usize,
}

impl CompressionOutcome {
    pub fn fits(&self, ceiling: usize) -> bool {
        self.final_tokens <= ceiling
    }

    pub fn was_compressed(&self) -> bool {
        self.stage != CompressionStage::Unchanged
    }
}

pub struct OverflowCompressor {
    meter: TokenMeter,
    facts: FactExtractor,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: CompressionConfig,
}

impl OverflowCompressor {
    pub fn new(meter: TokenMeter, config: CompressionConfig) -> Result<Self> {
        Ok(Self {
            facts: FactExtractor::new(&config)?,
            meter,
            summarizer: None,
            config,
        })
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn meter(&self) -> &TokenMeter {
        &self.meter
    }

    pub fn facts(&self) -> &FactExtractor {
        &self.facts
    }

    /// Shrink `content` to at most `ceiling` tokens.
    ///
    /// Never fails. The result exceeds the ceiling only when even the bare
    /// truncation marker does not fit.
    pub async fn compress(&self, content: &str, ceiling: usize) -> CompressionOutcome {
        self.compress_counted(content, self.meter.count(content), ceiling).await
    }

    /// [`compress`](Self::compress) for content the caller has already
    /// measured. `original_tokens` must be this meter's count of `content`.
    pub async fn compress_counted(
        &self,
        content: &str,
        original_tokens: usize,
        ceiling: usize,
    ) -> CompressionOutcome {
        if original_tokens <= ceiling {
            return CompressionOutcome {
                text: content.to_string(),
                stage: CompressionStage::Unchanged,
                media_dropped: 0,
                original_tokens,
                final_tokens: original_tokens,
            };
        }

        // ── Stage 1: media reduction ──────────────────────────────────────
        let (text, markers) = self.meter.scanner().extract(content);
        let had_markers = !markers.is_empty();
        let mut media = MediaSplit::new(text, markers, self.config.max_media_markers);
        // Kept markers must leave room for at least the truncation marker.
        while !media.kept.is_empty() && !self.fits(&media.render(TRUNCATION_MARKER), ceiling) {
            media.drop_last();
        }
        if had_markers {
            let candidate = media.render(&media.text);
            if self.fits(&candidate, ceiling) {
                return self.finish(candidate, CompressionStage::Media, &media, original_tokens);
            }
        }

        // ── Stage 2: summarization ────────────────────────────────────────
        if let Some(summary) = self.summarize(&media.text, ceiling).await {
            let candidate = media.render(&summary);
            if self.fits(&candidate, ceiling) {
                return self.finish(candidate, CompressionStage::Summary, &media, original_tokens);
            }
            debug!(ceiling, "Summary still over ceiling, extracting facts");
        }

        // ── Stage 3: fact extraction ──────────────────────────────────────
        let facts = self.facts.extract(&media.text);
        let candidate = media.render(&facts);
        if self.fits(&candidate, ceiling) {
            return self.finish(candidate, CompressionStage::Facts, &media, original_tokens);
        }

        // ── Stage 4: hard truncation ──────────────────────────────────────
        let truncated = self.truncate(&facts, &media, ceiling);
        self.finish(truncated, CompressionStage::Truncated, &media, original_tokens)
    }

    fn fits(&self, text: &str, ceiling: usize) -> bool {
        self.meter.count(text) <= ceiling
    }

    fn finish(
        &self,
        text: String,
        stage: CompressionStage,
        media: &MediaSplit,
        original_tokens: usize,
    ) -> CompressionOutcome {
        let final_tokens = self.meter.count(&text);
        debug!(%stage, original_tokens, final_tokens, media_dropped = media.dropped, "Compressed");
        CompressionOutcome {
            text,
            stage,
            media_dropped: media.dropped,
            original_tokens,
            final_tokens,
        }
    }

    async fn summarize(&self, text: &str, ceiling: usize) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        if text.chars().count() < self.config.summarize_min_chars {
            return None;
        }

        let input = prefix_chars(text, self.config.summary_input_chars);
        let max_output_tokens = self.config.summary_max_tokens.min(ceiling).max(1);
        let deadline = Duration::from_millis(self.config.summary_timeout_ms);

        match tokio::time::timeout(deadline, summarizer.summarize(input, max_output_tokens)).await {
            Ok(Ok(summary)) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
            Ok(Ok(_)) => {
                warn!(summarizer = summarizer.name(), "Empty summary, falling back to fact extraction");
                None
            }
            Ok(Err(e)) => {
                warn!(summarizer = summarizer.name(), error = %e, "Summarizer failed, falling back to fact extraction");
                None
            }
            Err(_) => {
                warn!(
                    summarizer = summarizer.name(),
                    timeout_ms = self.config.summary_timeout_ms,
                    "Summarizer timed out, falling back to fact extraction"
                );
                None
            }
        }
    }

    fn truncate(&self, body: &str, media: &MediaSplit, ceiling: usize) -> String {
        let body = body.trim();
        let mut take = (ceiling * self.config.chars_per_token).min(body.chars().count());

        loop {
            let cut = prefix_chars(body, take).trim_end();
            let marked = if cut.is_empty() {
                TRUNCATION_MARKER.to_string()
            } else {
                format!("{cut} {TRUNCATION_MARKER}")
            };
            let candidate = media.render(&marked);
            if self.fits(&candidate, ceiling) {
                return candidate;
            }
            if take == 0 {
                break;
            }
            take = take.saturating_sub((take / 8).max(1));
        }

        // Only reachable with no kept markers: drop the note too.
        let bare = media.render_without_note(TRUNCATION_MARKER);
        if !self.fits(&bare, ceiling) {
            warn!(ceiling, "Ceiling below the truncation marker; returning marker alone");
        }
        bare
    }
}

/// The first `n` characters of `text`, cut on a char boundary.
fn prefix_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingSummarizer, FixedSummarizer, SlowSummarizer, compressor};

    fn words(n: usize) -> String {
        "lorem ipsum dolor sit amet ".repeat(n)
    }

    #[tokio::test]
    async fn fitting_content_is_unchanged() {
        let c = compressor(None);
        let out = c.compress("short note", 10).await;
        assert_eq!(out.stage, CompressionStage::Unchanged);
        assert_eq!(out.text, "short note");
        assert!(!out.was_compressed());
    }

    #[tokio::test]
    async fn media_stage_drops_excess_markers() {
        let c = compressor(None);
        let content = "Screenshots attached [image:a1] [image:b2] [image:c3] [image:d4]";
        // 4 markers = 340 tokens; 2 markers + text + note fit in 200.
        let out = c.compress(content, 200).await;
        assert_eq!(out.stage, CompressionStage::Media);
        assert_eq!(out.media_dropped, 2);
        assert!(out.text.contains("[image:a1] [image:b2]"));
        assert!(!out.text.contains("[image:c3]"));
        assert!(out.text.contains("[2 media attachment(s) omitted to fit context budget]"));
        assert!(out.fits(200));
    }

    #[tokio::test]
    async fn summary_used_when_it_fits() {
        let summarizer = Arc::new(FixedSummarizer::new("Build passed; 3 warnings in parser.rs."));
        let c = compressor(Some(summarizer.clone()));
        let out = c.compress(&words(100), 50).await;
        assert_eq!(out.stage, CompressionStage::Summary);
        assert_eq!(out.text, "Build passed; 3 warnings in parser.rs.");
        assert_eq!(summarizer.calls(), 1);
    }

    #[tokio::test]
    async fn summarizer_input_is_capped() {
        let summarizer = Arc::new(FixedSummarizer::new("ok"));
        let c = compressor(Some(summarizer.clone()));
        c.compress(&"é".repeat(10_000), 50).await;
        assert_eq!(summarizer.last_input_chars(), Some(3000));
        assert_eq!(summarizer.last_max_tokens(), Some(50));
    }

    #[tokio::test]
    async fn short_text_skips_summarizer() {
        let summarizer = Arc::new(FixedSummarizer::new("never"));
        let c = compressor(Some(summarizer.clone()));
        // 300 chars: over a 20-token ceiling but below summarize_min_chars.
        c.compress(&"abcdefghij".repeat(30), 20).await;
        assert_eq!(summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn failing_summarizer_falls_through_to_facts() {
        let c = compressor(Some(Arc::new(FailingSummarizer::default())));
        let content = format!(
            "Observation: fetched https://example.com/guide {} saved notes.md",
            words(150)
        );
        assert!(content.len() > 4000);
        let out = c.compress(&content, 100).await;
        assert_eq!(out.stage, CompressionStage::Facts);
        assert!(out.text.starts_with("URL: https://example.com/guide"));
        assert!(out.text.contains("Files: notes.md"));
        assert!(out.text.chars().count() <= 100 * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_summarizer_times_out() {
        let c = compressor(Some(Arc::new(SlowSummarizer::new(Duration::from_secs(60)))));
        let out = c.compress(&words(100), 60).await;
        assert_ne!(out.stage, CompressionStage::Summary);
        assert!(out.fits(60));
    }

    #[tokio::test]
    async fn facts_fallback_to_excerpt() {
        let c = compressor(None);
        let out = c.compress(&format!("Observation: {}", words(50)), 60).await;
        assert_eq!(out.stage, CompressionStage::Facts);
        assert!(out.text.starts_with("lorem ipsum"));
        assert!(out.text.chars().count() <= 150);
    }

    #[tokio::test]
    async fn tiny_ceiling_truncates() {
        let c = compressor(None);
        let out = c.compress(&words(50), 10).await;
        assert_eq!(out.stage, CompressionStage::Truncated);
        assert!(out.text.ends_with(TRUNCATION_MARKER));
        assert!(out.fits(10));
        assert!(out.text.chars().count() <= 40);
    }

    #[tokio::test]
    async fn zero_ceiling_returns_marker_alone() {
        let c = compressor(None);
        let out = c.compress(&words(10), 0).await;
        assert_eq!(out.text, TRUNCATION_MARKER);
        assert_eq!(out.stage, CompressionStage::Truncated);
    }

    #[tokio::test]
    async fn surviving_markers_are_byte_identical() {
        let c = compressor(Some(Arc::new(FailingSummarizer::default())));
        let marker = "[image:data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB]";
        let content = format!("{marker} {}", words(200));
        let out = c.compress(&content, 150).await;
        assert_ne!(out.stage, CompressionStage::Unchanged);
        assert!(out.text.contains(marker));
        assert!(out.fits(150));
    }

    #[tokio::test]
    async fn markers_that_cannot_fit_are_dropped() {
        let c = compressor(None);
        let content = format!("[image:a] {}", words(20));
        let out = c.compress(&content, 50).await;
        assert!(!out.text.contains("[image:a]"));
        assert_eq!(out.media_dropped, 1);
    }

    #[tokio::test]
    async fn compression_is_idempotent() {
        let c = compressor(Some(Arc::new(FailingSummarizer::default())));
        let inputs = [
            words(200),
            format!("[image:x] [image:y] [image:z] {}", words(80)),
            format!("Observation: https://a.dev v1.2.3 {}", words(100)),
            "x".repeat(5000),
        ];
        for input in &inputs {
            for ceiling in [0, 3, 10, 40, 100, 400] {
                let once = c.compress(input, ceiling).await;
                let twice = c.compress(&once.text, ceiling).await;
                assert_eq!(once.text, twice.text, "ceiling {ceiling}");
            }
        }
    }

    #[test]
    fn prefix_chars_respects_boundaries() {
        assert_eq!(prefix_chars("héllo", 2), "hé");
        assert_eq!(prefix_chars("hi", 10), "hi");
        assert_eq!(prefix_chars("hi", 0), "");
    }
}
