//! Segments — named, priority-tagged slices of the assembled prompt.
//!
//! Segments are rebuilt from the caller's inputs on every turn and are never
//! persisted.

use serde::{Deserialize, Serialize};

/// The five slices every assembled prompt is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    Preamble,
    WorkingMemory,
    RetrievedMemory,
    History,
    Reserve,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 5] = [
        SegmentKind::Preamble,
        SegmentKind::WorkingMemory,
        SegmentKind::RetrievedMemory,
        SegmentKind::History,
        SegmentKind::Reserve,
    ];

    /// 1 = never truncated … 4 = fully elastic.
    pub fn priority(self) -> u8 {
        match self {
            SegmentKind::Preamble | SegmentKind::WorkingMemory => 1,
            SegmentKind::RetrievedMemory => 2,
            SegmentKind::History => 3,
            SegmentKind::Reserve => 4,
        }
    }

    /// Priority-1 segments are always included verbatim.
    pub fn is_critical(self) -> bool {
        self.priority() == 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SegmentKind::Preamble => "preamble",
            SegmentKind::WorkingMemory => "working-memory",
            SegmentKind::RetrievedMemory => "retrieved-memory",
            SegmentKind::History => "history",
            SegmentKind::Reserve => "reserve",
        }
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One segment as sized in a single assembly pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub priority: u8,
    pub min_fraction: f64,
    pub max_fraction: f64,
    pub actual_tokens: usize,
}

impl Segment {
    pub fn new(kind: SegmentKind, min_fraction: f64, max_fraction: f64) -> Self {
        Self {
            kind,
            priority: kind.priority(),
            min_fraction,
            max_fraction,
            actual_tokens: 0,
        }
    }

    pub fn with_actual(mut self, tokens: usize) -> Self {
        self.actual_tokens = tokens;
        self
    }

    /// `ceil(total * max_fraction)`.
    pub fn nominal_max(&self, total_budget: usize) -> usize {
        (total_budget as f64 * self.max_fraction).ceil() as usize
    }

    /// `floor(total * min_fraction)`.
    pub fn nominal_min(&self, total_budget: usize) -> usize {
        (total_budget as f64 * self.min_fraction).floor() as usize
    }

    /// Whether this segment ended above its nominal maximum.
    pub fn exceeds_max(&self, total_budget: usize) -> bool {
        self.actual_tokens > self.nominal_max(total_budget)
    }
}
