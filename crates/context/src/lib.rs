//! The context-window budget allocator — the heart of windowpack.
//!
//! Every turn, [`BudgetAllocator::assemble`] packs a system preamble, a
//! working-memory snapshot, retrieved knowledge and conversation history into
//! a fixed token capacity:
//!
//! 1. **Measure** the priority-1 segments (preamble, working memory), which
//!    are never shortened
//! 2. **Reserve** a safety margin for backend formatting overhead
//! 3. **Retrieve** knowledge with an adaptively sized `k`
//! 4. **Protect** the history floor by clawing back retrieved memory
//! 5. **Trim** history newest-first, compressing at most one message
//! 6. **Report** the allocation as an immutable [`AllocationReport`]
//!
//! # Segments
//!
//! | Segment | Priority | Trim Strategy |
//! |---------|----------|---------------|
//! | Preamble | 1 | Never trimmed |
//! | Working Memory | 1 | Never trimmed |
//! | Retrieved Memory | 2 | Sized by result count, lowest-ranked dropped |
//! | History | 3 | Oldest dropped, one message compressed |
//! | Reserve | 4 | Fixed fraction |
//!
//! Compression is a fixed cascade (media → summary → facts → truncation), see
//! [`OverflowCompressor`]. The session-wide pass in [`SessionCompactor`] uses
//! the same primitives eagerly.

pub mod allocator;
pub mod compaction;
pub mod compressor;
pub mod generation;
pub mod meter;
pub mod report;
pub mod trimmer;
pub mod working_memory;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use allocator::{Assembly, BudgetAllocator};
pub use compaction::{CompactionOutcome, CompactionStats, SessionCompactor};
pub use compressor::{CompressionOutcome, CompressionStage, FactExtractor, OverflowCompressor};
pub use generation::{
    ContextStats, GenerationPlan, GenerationPlanner, PlannedAction, context_stats, emergency_trim,
};
pub use meter::TokenMeter;
pub use report::{AllocationReport, LedgerEntry, LedgerReason, ReportBuilder};
pub use trimmer::{HistoryTrimmer, TrimOutcome};
pub use working_memory::{Plan, PlanStep, StepStatus, WorkingMemory};
