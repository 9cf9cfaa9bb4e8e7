//! Budget allocation — packs one turn's context into a fixed capacity.
//!
//! Segments are sized in priority order. Preamble and working memory are
//! measured and never shortened, a fixed reserve is set aside, retrieval is
//! sized by result count, and history gets whatever remains (but never less
//! than its floor while retrieved memory can still give tokens back).
//!
//! Redistribution only ever flows toward history. History never returns
//! unused headroom to memory within a turn.
//!
//! A larger budget never shrinks the priority-1 segments, the reserve,
//! retrieved memory, or the pool shared by memory and history. Memory grows
//! by whole results, so at the budget where one more result starts to fit,
//! history gives up to one result's worth of tokens to it. Between those
//! steps history never shrinks either.

use std::sync::Arc;
use tracing::{debug, info, warn};
use windowpack_config::{AppConfig, BudgetConfig, RetrievalConfig};
use windowpack_core::error::{Error, Result};
use windowpack_core::knowledge::KnowledgeSource;
use windowpack_core::message::Message;
use windowpack_core::provider::Summarizer;
use windowpack_core::segment::SegmentKind;
use windowpack_core::token::TokenCounter;

use crate::compressor::OverflowCompressor;
use crate::meter::TokenMeter;
use crate::report::{AllocationReport, LedgerReason, ReportBuilder};
use crate::trimmer::HistoryTrimmer;
use crate::working_memory::WorkingMemory;

/// Header line of the retrieved-memory block.
pub const MEMORY_HEADER: &str = "[Retrieved Memory]";

/// The output of one assembly pass.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Preamble, retrieved memory and working memory, joined by the separator.
    pub preamble: String,
    /// Kept history, oldest first. At most one message is a compressed copy.
    pub history: Vec<Message>,
    pub report: AllocationReport,
}

/// Ranked results currently selected for the memory segment.
struct Retrieved {
    results: Vec<String>,
    k: usize,
    tokens: usize,
}

pub struct BudgetAllocator {
    budget: BudgetConfig,
    retrieval: RetrievalConfig,
    meter: TokenMeter,
    knowledge: Arc<dyn KnowledgeSource>,
    trimmer: HistoryTrimmer,
}

impl BudgetAllocator {
    pub fn new(
        budget: BudgetConfig,
        retrieval: RetrievalConfig,
        compressor: Arc<OverflowCompressor>,
        knowledge: Arc<dyn KnowledgeSource>,
    ) -> Result<Self> {
        for kind in SegmentKind::ALL {
            let b = budget.bounds(kind);
            if !(0.0 <= b.min_fraction && b.min_fraction <= b.max_fraction && b.max_fraction <= 1.0) {
                return Err(Error::config(format!(
                    "{kind} bounds must satisfy 0 <= min <= max <= 1 (got {} / {})",
                    b.min_fraction, b.max_fraction
                )));
            }
        }
        if retrieval.initial_k == 0 || retrieval.initial_k > retrieval.max_k {
            return Err(Error::config(format!(
                "retrieval k must satisfy 1 <= initial_k <= max_k (got {} / {})",
                retrieval.initial_k, retrieval.max_k
            )));
        }

        Ok(Self {
            meter: compressor.meter().clone(),
            trimmer: HistoryTrimmer::new(compressor, budget.compress_slack_fraction),
            budget,
            retrieval,
            knowledge,
        })
    }

    /// Build the full pipeline from configuration.
    pub fn from_config(
        config: &AppConfig,
        counter: Arc<dyn TokenCounter>,
        knowledge: Arc<dyn KnowledgeSource>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Result<Self> {
        config.validate()?;
        let meter = TokenMeter::new(counter, &config.compression);
        let mut compressor = OverflowCompressor::new(meter, config.compression.clone())?;
        if let Some(s) = summarizer {
            compressor = compressor.with_summarizer(s);
        }
        Self::new(
            config.budget.clone(),
            config.retrieval.clone(),
            Arc::new(compressor),
            knowledge,
        )
    }

    pub fn meter(&self) -> &TokenMeter {
        &self.meter
    }

    /// Assemble one turn's context.
    ///
    /// Only malformed input is an error. A budget too small for the critical
    /// segments still returns, with `report.over_budget` set.
    pub async fn assemble(
        &self,
        preamble: &str,
        working_memory: &WorkingMemory,
        history: &[Message],
        query: &str,
        total_budget: usize,
    ) -> Result<Assembly> {
        if total_budget == 0 {
            return Err(Error::InvalidInput("total budget must be positive".into()));
        }
        let sep = self.budget.segment_separator.as_str();
        let mut report = ReportBuilder::new(total_budget, &self.budget);

        // ── Priority 1: preamble + working memory (never trimmed) ────────
        let wm_text = working_memory.render();
        let wm_block = if wm_text.is_empty() {
            String::new()
        } else {
            format!("{sep}{wm_text}")
        };
        let preamble_tokens = self.meter.count(preamble);
        let wm_tokens = self.meter.count(&wm_block);
        let critical = preamble_tokens + wm_tokens;
        report.set_tokens(SegmentKind::Preamble, preamble_tokens);
        report.set_tokens(SegmentKind::WorkingMemory, wm_tokens);

        let warn_at = fraction_of(total_budget, self.budget.critical_warn_fraction);
        if critical > warn_at {
            warn!(
                critical,
                total_budget,
                "Preamble and working memory use more than {:.0}% of the budget",
                self.budget.critical_warn_fraction * 100.0
            );
            report.warn(format!(
                "critical segments use {critical} of {total_budget} tokens"
            ));
        }
        for (kind, tokens) in [
            (SegmentKind::Preamble, preamble_tokens),
            (SegmentKind::WorkingMemory, wm_tokens),
        ] {
            let max = ceil_fraction_of(total_budget, self.budget.bounds(kind).max_fraction);
            if tokens > max {
                report.warn(format!("{kind} uses {tokens} tokens, above its max of {max}"));
            }
        }

        // ── Priority 4: reserve ───────────────────────────────────────────
        let reserve = fraction_of(total_budget, self.budget.reserve.min_fraction);
        report.set_tokens(SegmentKind::Reserve, reserve);
        let available = total_budget.saturating_sub(critical + reserve);
        if critical + reserve > total_budget {
            warn!(critical, reserve, total_budget, "Critical segments and reserve exceed the budget");
            report.mark_over_budget();
        }

        // ── Priority 2: retrieved memory ──────────────────────────────────
        let search_query = search_query(working_memory.search_hint(), query);
        let mut memory = self.retrieve(&search_query, total_budget).await;

        let target = fraction_of(total_budget, self.budget.memory_target_fraction);
        report.redistribute(
            Some(SegmentKind::RetrievedMemory),
            SegmentKind::History,
            target.saturating_sub(memory.tokens),
            LedgerReason::UnusedTarget,
        );

        // ── Priority 3: history floor ─────────────────────────────────────
        let history_floor = fraction_of(total_budget, self.budget.history.min_fraction);
        let before_clawback = memory.tokens;
        while available.saturating_sub(memory.tokens) < history_floor && !memory.results.is_empty() {
            memory.results.pop();
            memory.tokens = self.meter.count(&self.memory_block(&memory.results));
        }
        let clawed_back = before_clawback - memory.tokens;
        if clawed_back > 0 {
            info!(
                clawed_back,
                results_left = memory.results.len(),
                history_floor,
                "Retrieved memory reduced to protect the history floor"
            );
            report.redistribute(
                Some(SegmentKind::RetrievedMemory),
                SegmentKind::History,
                clawed_back,
                LedgerReason::HistoryFloor,
            );
        }
        report.set_tokens(SegmentKind::RetrievedMemory, memory.tokens);
        report.retrieval(memory.k, memory.results.len());

        let history_budget = available.saturating_sub(memory.tokens);
        if history_budget < history_floor {
            warn!(history_budget, history_floor, "History budget below its floor");
            report.warn(format!(
                "history budget {history_budget} is below its floor of {history_floor}"
            ));
            report.mark_over_budget();
        }

        // ── History ───────────────────────────────────────────────────────
        let trimmed = self.trimmer.trim(history, history_budget).await;
        report.set_tokens(SegmentKind::History, trimmed.tokens_used);
        report.history(history_budget, trimmed.compressed_count, trimmed.trimmed_count);

        let unused = history_budget - trimmed.tokens_used;
        if unused >= self.budget.unused_report_threshold {
            debug!(unused, history_budget, "History left budget unused");
            report.unused_history(unused);
        }

        let history_max = ceil_fraction_of(total_budget, self.budget.history.max_fraction);
        if trimmed.tokens_used > history_max {
            let above = trimmed.tokens_used - history_max;
            info!(above, history_max, "History raised above its max into unused headroom");
            report.redistribute(None, SegmentKind::History, above, LedgerReason::HeadroomAboveMax);
        }

        // ── Final preamble ────────────────────────────────────────────────
        let memory_block = self.memory_block(&memory.results);
        let assembled = format!("{preamble}{memory_block}{wm_block}");

        let report = report.finish();
        report.emit();

        Ok(Assembly {
            preamble: assembled,
            history: trimmed.kept,
            report,
        })
    }

    /// Query the knowledge source, widening `k` while results are sparse and
    /// narrowing by dropping trailing results above the segment max.
    async fn retrieve(&self, query: &str, total_budget: usize) -> Retrieved {
        let mut k = self.retrieval.initial_k;
        if query.is_empty() {
            return Retrieved {
                results: Vec::new(),
                k: 0,
                tokens: 0,
            };
        }

        let target = fraction_of(total_budget, self.budget.memory_target_fraction);
        let widen_below = target as f64 * self.retrieval.widen_below_fraction;

        let mut results = self.search(query, k).await;
        let mut tokens = self.meter.count(&self.memory_block(&results));
        while (tokens as f64) < widen_below && results.len() == k && k < self.retrieval.max_k {
            k = (k + self.retrieval.widen_step).min(self.retrieval.max_k);
            debug!(k, tokens, target, "Widening retrieval");
            results = self.search(query, k).await;
            tokens = self.meter.count(&self.memory_block(&results));
        }

        let ceiling = fraction_of(total_budget, self.budget.retrieved_memory.max_fraction);
        while tokens > ceiling && !results.is_empty() {
            results.pop();
            tokens = self.meter.count(&self.memory_block(&results));
        }
        if results.len() < k {
            debug!(k, kept = results.len(), tokens, ceiling, "Retrieval sized");
        }

        Retrieved { results, k, tokens }
    }

    async fn search(&self, query: &str, k: usize) -> Vec<String> {
        match self.knowledge.search(query, k).await {
            Ok(mut results) => {
                results.retain(|r| !r.trim().is_empty());
                results.truncate(k);
                results
            }
            Err(e) => {
                warn!(source = self.knowledge.name(), error = %e, "Knowledge search failed, continuing without memory");
                Vec::new()
            }
        }
    }

    /// `separator + header + numbered snippets`, or `""` with no results.
    fn memory_block(&self, results: &[String]) -> String {
        if results.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r.trim()))
            .collect();
        format!(
            "{}{MEMORY_HEADER}\n{}",
            self.budget.segment_separator,
            lines.join("\n")
        )
    }
}

/// The goal steers retrieval toward the task, ahead of the turn's query.
fn search_query(goal: Option<&str>, query: &str) -> String {
    let query = query.trim();
    match goal {
        Some(goal) if !query.is_empty() => format!("{goal} {query}"),
        Some(goal) => goal.to_string(),
        None => query.to_string(),
    }
}

fn fraction_of(total: usize, fraction: f64) -> usize {
    (total as f64 * fraction).floor() as usize
}

fn ceil_fraction_of(total: usize, fraction: f64) -> usize {
    (total as f64 * fraction).ceil() as usize
}

// ── Tests ─────────────────────────────────────────────────────────────────
