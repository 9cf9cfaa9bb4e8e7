//! Session-wide compaction — the proactive counterpart to per-turn trimming.
//!
//! Runs when the generation planner reports usage above the compaction
//! trigger. Applies the overflow cascade eagerly across the whole history:
//!
//! 1. **Compress** every message longer than the character threshold
//! 2. **Harvest** facts from tool observations into the knowledge source
//! 3. **Clean** transient format errors, empty observations and duplicates
//!
//! The first message (the task) is always kept as is. The input history is
//! never modified.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use windowpack_config::CompactionConfig;
use windowpack_core::knowledge::KnowledgeSource;
use windowpack_core::message::Message;

use crate::compressor::OverflowCompressor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionStats {
    pub original_count: usize,
    pub final_count: usize,
    pub compressed: usize,
    pub facts_saved: usize,
    pub removed_transient: usize,
    pub removed_empty: usize,
    pub removed_duplicates: usize,
}

impl CompactionStats {
    pub fn removed(&self) -> usize {
        self.removed_transient + self.removed_empty + self.removed_duplicates
    }

    /// Percentage of messages removed.
    pub fn reduction_pct(&self) -> f64 {
        if self.original_count == 0 {
            0.0
        } else {
            (self.original_count - self.final_count) as f64 / self.original_count as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub messages: Vec<Message>,
    pub stats: CompactionStats,
}

pub struct SessionCompactor {
    compressor: Arc<OverflowCompressor>,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    config: CompactionConfig,
}

impl SessionCompactor {
    pub fn new(compressor: Arc<OverflowCompressor>, config: CompactionConfig) -> Self {
        Self {
            compressor,
            knowledge: None,
            config,
        }
    }

    /// Store harvested facts here.
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub async fn compact(&self, history: &[Message]) -> CompactionOutcome {
        let mut stats = CompactionStats {
            original_count: history.len(),
            ..CompactionStats::default()
        };
        let Some((first, rest)) = history.split_first() else {
            return CompactionOutcome {
                messages: Vec::new(),
                stats,
            };
        };
        info!(messages = history.len(), "Compacting session history");

        // ── Step 1: compress long messages ──
        let mut compressed: Vec<Message> = Vec::with_capacity(rest.len());
        for msg in rest {
            if msg.content.chars().count() > self.config.long_message_chars {
                let outcome = self
                    .compressor
                    .compress(&msg.content, self.config.compressed_message_tokens)
                    .await;
                if outcome.was_compressed() {
                    debug!(message_id = %msg.id, stage = %outcome.stage, "Compressed long message");
                    compressed.push(msg.compressed_copy(outcome.text));
                    stats.compressed += 1;
                    continue;
                }
            }
            compressed.push(msg.clone());
        }

        // ── Step 2: harvest facts from original observations ──
        if self.config.harvest_facts {
            stats.facts_saved = self.harvest(rest).await;
        }

        // ── Step 3: drop transient errors, empty observations, duplicates ──
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(self.dedup_key(&first.content));
        let mut messages = vec![first.clone()];
        for msg in compressed {
            let content = msg.content.as_str();
            if self
                .config
                .transient_markers
                .iter()
                .any(|m| content.contains(m.as_str()))
            {
                stats.removed_transient += 1;
                continue;
            }
            if content.trim() == self.config.observation_prefix.trim() {
                stats.removed_empty += 1;
                continue;
            }
            if !seen.insert(self.dedup_key(content)) {
                stats.removed_duplicates += 1;
                continue;
            }
            messages.push(msg);
        }

        stats.final_count = messages.len();
        info!(
            before = stats.original_count,
            after = stats.final_count,
            compressed = stats.compressed,
            facts_saved = stats.facts_saved,
            removed = stats.removed(),
            reduction = format!("{:.1}%", stats.reduction_pct()),
            "Compaction complete"
        );

        CompactionOutcome { messages, stats }
    }

    async fn harvest(&self, messages: &[Message]) -> usize {
        let Some(knowledge) = &self.knowledge else {
            return 0;
        };
        let extractor = self.compressor.facts();
        let mut saved = 0;
        for msg in messages {
            if !msg.content.starts_with(&self.config.observation_prefix) {
                continue;
            }
            let Some(facts) = extractor.facts(&msg.content) else {
                continue;
            };
            if facts.chars().count() <= self.config.min_fact_chars {
                continue;
            }
            match knowledge.remember(&facts).await {
                Ok(true) => {
                    debug!(source = knowledge.name(), "Saved fact");
                    saved += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(source = knowledge.name(), error = %e, "Failed to save fact");
                }
            }
        }
        saved
    }

    fn dedup_key(&self, content: &str) -> String {
        content.chars().take(self.config.dedup_prefix_chars).collect()
    }
}
