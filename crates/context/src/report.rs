//! Allocation reports — what one assembly pass did with the budget.
//!
//! A report is built once per pass by [`ReportBuilder`] and is immutable
//! afterward. The allocator never reads a report back; it exists for logs,
//! the CLI and tests.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use windowpack_config::BudgetConfig;
use windowpack_core::segment::{Segment, SegmentKind};

// ── Types ─────────────────────────────────────────────────────────────────

/// Why tokens moved between segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerReason {
    /// Retrieval came in under its target; the difference stays with history.
    UnusedTarget,
    /// Retrieved memory was reduced to protect the history floor.
    HistoryFloor,
    /// History grew past its nominal max into headroom left by others.
    HeadroomAboveMax,
}

impl std::fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnusedTarget => "unused-target",
            Self::HistoryFloor => "history-floor",
            Self::HeadroomAboveMax => "headroom-above-max",
        };
        f.write_str(s)
    }
}

/// One redistribution event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Source segment; `None` for pooled headroom.
    pub from: Option<SegmentKind>,
    pub to: SegmentKind,
    pub tokens: usize,
    pub reason: LedgerReason,
}

impl std::fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let from = self.from.map_or("headroom", SegmentKind::as_str);
        write!(
            f,
            "{} → {}: {} tokens ({})",
            from, self.to, self.tokens, self.reason
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationReport {
    pub total_budget: usize,
    /// All five segments, in priority order.
    pub segments: Vec<Segment>,
    pub reserve_tokens: usize,
    /// Tokens of assembled content, excluding the reserve.
    pub used_tokens: usize,
    /// `used_tokens / total_budget` (0.0–100.0, higher when over budget).
    pub utilization_pct: f32,
    pub history_budget: usize,
    pub compressed_count: usize,
    pub trimmed_count: usize,
    /// Final `k` asked of the knowledge source.
    pub retrieval_k: usize,
    /// Results kept in the memory segment.
    pub retrieved_results: usize,
    pub ledger: Vec<LedgerEntry>,
    /// History budget left unused, when large enough to record.
    pub unused_history_tokens: usize,
    pub over_budget: bool,
    pub warnings: Vec<String>,
}

impl AllocationReport {
    pub fn segment(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == kind)
    }

    pub fn tokens(&self, kind: SegmentKind) -> usize {
        self.segment(kind).map_or(0, |s| s.actual_tokens)
    }

    pub fn total_redistributed(&self) -> usize {
        self.ledger.iter().map(|e| e.tokens).sum()
    }

    /// Log the report as a single structured event.
    pub fn emit(&self) {
        info!(
            total_budget = self.total_budget,
            used = self.used_tokens,
            reserve = self.reserve_tokens,
            utilization = format!("{:.1}%", self.utilization_pct),
            preamble = self.tokens(SegmentKind::Preamble),
            working_memory = self.tokens(SegmentKind::WorkingMemory),
            retrieved_memory = self.tokens(SegmentKind::RetrievedMemory),
            history = self.tokens(SegmentKind::History),
            compressed = self.compressed_count,
            trimmed = self.trimmed_count,
            redistributed = self.total_redistributed(),
            over_budget = self.over_budget,
            "Context assembled"
        );
        if self.over_budget {
            warn!(report = %self.to_log_string(), "Assembly is over budget");
        }
    }

    /// One-line summary, e.g. `912/1000 tokens (91.2%), 2 compressed, 40 trimmed`.
    pub fn to_log_string(&self) -> String {
        let mut out = format!(
            "{}/{} tokens ({:.1}%), {} compressed, {} trimmed",
            self.used_tokens,
            self.total_budget,
            self.utilization_pct,
            self.compressed_count,
            self.trimmed_count
        );
        if self.over_budget {
            out.push_str(", over budget");
        }
        out
    }
}

impl std::fmt::Display for AllocationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Budget {} tokens | used {} ({:.1}%) | reserve {}{}",
            self.total_budget,
            self.used_tokens,
            self.utilization_pct,
            self.reserve_tokens,
            if self.over_budget { " | OVER BUDGET" } else { "" }
        )?;
        for s in &self.segments {
            writeln!(
                f,
                "  [{}] {:<17} {:>7} / max {}",
                s.priority,
                s.kind.as_str(),
                s.actual_tokens,
                s.nominal_max(self.total_budget)
            )?;
        }
        writeln!(
            f,
            "  history budget {}, {} compressed, {} trimmed, retrieval k={} ({} kept)",
            self.history_budget,
            self.compressed_count,
            self.trimmed_count,
            self.retrieval_k,
            self.retrieved_results
        )?;
        if self.unused_history_tokens > 0 {
            writeln!(f, "  unused history headroom: {}", self.unused_history_tokens)?;
        }
        for entry in &self.ledger {
            writeln!(f, "  ledger: {entry}")?;
        }
        for w in &self.warnings {
            writeln!(f, "  warning: {w}")?;
        }
        Ok(())
    }
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Accumulates one pass; [`finish`](Self::finish) freezes it.
#[derive(Debug)]
pub struct ReportBuilder {
    total_budget: usize,
    segments: Vec<Segment>,
    history_budget: usize,
    compressed_count: usize,
    trimmed_count: usize,
    retrieval_k: usize,
    retrieved_results: usize,
    ledger: Vec<LedgerEntry>,
    unused_history_tokens: usize,
    over_budget: bool,
    warnings: Vec<String>,
}

impl ReportBuilder {
    pub fn new(total_budget: usize, budget: &BudgetConfig) -> Self {
        let segments = SegmentKind::ALL
            .iter()
            .map(|&kind| {
                let b = budget.bounds(kind);
                Segment::new(kind, b.min_fraction, b.max_fraction)
            })
            .collect();
        Self {
            total_budget,
            segments,
            history_budget: 0,
            compressed_count: 0,
            trimmed_count: 0,
            retrieval_k: 0,
            retrieved_results: 0,
            ledger: Vec::new(),
            unused_history_tokens: 0,
            over_budget: false,
            warnings: Vec::new(),
        }
    }

    pub fn set_tokens(&mut self, kind: SegmentKind, tokens: usize) {
        if let Some(s) = self.segments.iter_mut().find(|s| s.kind == kind) {
            s.actual_tokens = tokens;
        }
    }

    /// Record a redistribution. Zero-token moves are ignored.
    pub fn redistribute(
        &mut self,
        from: Option<SegmentKind>,
        to: SegmentKind,
        tokens: usize,
        reason: LedgerReason,
    ) {
        if tokens > 0 {
            self.ledger.push(LedgerEntry {
                from,
                to,
                tokens,
                reason,
            });
        }
    }

    pub fn retrieval(&mut self, k: usize, results: usize) {
        self.retrieval_k = k;
        self.retrieved_results = results;
    }

    pub fn history(&mut self, budget: usize, compressed: usize, trimmed: usize) {
        self.history_budget = budget;
        self.compressed_count = compressed;
        self.trimmed_count = trimmed;
    }

    pub fn unused_history(&mut self, tokens: usize) {
        self.unused_history_tokens = tokens;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn mark_over_budget(&mut self) {
        self.over_budget = true;
    }

    /// Freeze the report. Content plus reserve above the total always sets
    /// `over_budget`.
    pub fn finish(self) -> AllocationReport {
        let reserve_tokens = self
            .segments
            .iter()
            .find(|s| s.kind == SegmentKind::Reserve)
            .map_or(0, |s| s.actual_tokens);
        let used_tokens: usize = self
            .segments
            .iter()
            .filter(|s| s.kind != SegmentKind::Reserve)
            .map(|s| s.actual_tokens)
            .sum();
        let utilization_pct = if self.total_budget == 0 {
            0.0
        } else {
            (used_tokens as f32 / self.total_budget as f32) * 100.0
        };
        let over_budget = self.over_budget || used_tokens + reserve_tokens > self.total_budget;

        AllocationReport {
            total_budget: self.total_budget,
            segments: self.segments,
            reserve_tokens,
            used_tokens,
            utilization_pct,
            history_budget: self.history_budget,
            compressed_count: self.compressed_count,
            trimmed_count: self.trimmed_count,
            retrieval_k: self.retrieval_k,
            retrieved_results: self.retrieved_results,
            ledger: self.ledger,
            unused_history_tokens: self.unused_history_tokens,
            over_budget,
            warnings: self.warnings,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
