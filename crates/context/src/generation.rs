//! Generation ceiling — how many tokens the next completion may produce.
//!
//! Shares the allocator's budget arithmetic:
//!
//! ```text
//! ceiling = clamp(total - used - safety_buffer, floor, cap)
//! ```
//!
//! The same numbers decide whether the caller should compact the session
//! before the next turn, or cut history back hard when generation headroom
//! has run out.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use windowpack_config::GenerationConfig;
use windowpack_core::message::Message;

use crate::meter::TokenMeter;

/// What the caller should do before the next assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    Proceed,
    /// Utilization is above the trigger: run a session-wide compaction.
    Compact,
    /// Headroom is nearly gone: keep only the first and newest messages.
    EmergencyTrim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    /// Maximum tokens for the next completion.
    pub ceiling: usize,
    pub action: PlannedAction,
    pub used_tokens: usize,
    pub total_budget: usize,
    /// `used / total` (0.0–1.0).
    pub utilization: f64,
}

pub struct GenerationPlanner {
    config: GenerationConfig,
}

impl GenerationPlanner {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    /// `clamp(total - used - safety_buffer, floor, cap)`.
    pub fn ceiling(&self, total_budget: usize, used_tokens: usize) -> usize {
        self.clamp(self.headroom(total_budget, used_tokens))
    }

    pub fn plan(&self, total_budget: usize, used_tokens: usize) -> GenerationPlan {
        let headroom = self.headroom(total_budget, used_tokens);
        let utilization = if total_budget == 0 {
            1.0
        } else {
            used_tokens as f64 / total_budget as f64
        };

        let action = if utilization > self.config.compaction_trigger {
            PlannedAction::Compact
        } else if headroom < self.config.emergency_headroom {
            PlannedAction::EmergencyTrim
        } else {
            PlannedAction::Proceed
        };

        let ceiling = match action {
            PlannedAction::EmergencyTrim => self.clamp(headroom.max(self.config.emergency_headroom)),
            _ => self.clamp(headroom),
        };

        match action {
            PlannedAction::Compact => info!(
                used_tokens,
                total_budget,
                utilization = format!("{:.1}%", utilization * 100.0),
                "Context usage above compaction trigger"
            ),
            PlannedAction::EmergencyTrim => warn!(
                headroom,
                used_tokens,
                total_budget,
                "Generation headroom exhausted, emergency trim required"
            ),
            PlannedAction::Proceed => {}
        }

        GenerationPlan {
            ceiling,
            action,
            used_tokens,
            total_budget,
            utilization,
        }
    }

    fn headroom(&self, total_budget: usize, used_tokens: usize) -> usize {
        total_budget
            .saturating_sub(used_tokens)
            .saturating_sub(self.config.safety_buffer)
    }

    fn clamp(&self, tokens: usize) -> usize {
        tokens.clamp(self.config.floor, self.config.cap.max(self.config.floor))
    }
}

/// Keep the first message (the task) and the newest `max(2, n/2) - 1`.
///
/// Histories of two messages or fewer are returned whole.
pub fn emergency_trim(history: &[Message]) -> Vec<Message> {
    let n = history.len();
    if n <= 2 {
        return history.to_vec();
    }
    let recent = (n / 2).max(2) - 1;
    let mut kept = Vec::with_capacity(recent + 1);
    kept.push(history[0].clone());
    kept.extend_from_slice(&history[n - recent..]);
    warn!(before = n, after = kept.len(), "Emergency trim applied");
    kept
}

// ── Session statistics ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub total_tokens: usize,
    pub capacity: usize,
    pub usage_pct: f64,
    pub message_count: usize,
    pub available_tokens: usize,
}

/// Token usage of a session as it stands, before any allocation.
pub fn context_stats(
    meter: &TokenMeter,
    history: &[Message],
    preamble: &str,
    capacity: usize,
) -> ContextStats {
    let total_tokens = meter.count(preamble) + meter.count_messages(history);
    let usage_pct = if capacity == 0 {
        100.0
    } else {
        total_tokens as f64 / capacity as f64 * 100.0
    };
    ContextStats {
        total_tokens,
        capacity,
        usage_pct,
        message_count: history.len(),
        available_tokens: capacity.saturating_sub(total_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> GenerationPlanner {
        GenerationPlanner::new(GenerationConfig::default())
    }

    #[test]
    fn ceiling_clamps_to_cap() {
        assert_eq!(planner().ceiling(32_000, 1_000), 4096);
    }

    #[test]
    fn ceiling_clamps_to_floor() {
        assert_eq!(planner().ceiling(8_000, 7_900), 256);
        assert_eq!(planner().ceiling(1_000, 5_000), 256);
    }

    #[test]
    fn ceiling_in_range_is_exact() {
        // 10_000 - 5_000 - 3_072
        assert_eq!(planner().ceiling(10_000, 5_000), 1928);
    }

    #[test]
    fn proceed_with_room() {
        let plan = planner().plan(24_576, 4_000);
        assert_eq!(plan.action, PlannedAction::Proceed);
        assert_eq!(plan.ceiling, 4096);
    }

    #[test]
    fn compact_above_trigger() {
        let plan = planner().plan(10_000, 8_100);
        assert_eq!(plan.action, PlannedAction::Compact);
        assert!(plan.utilization > 0.8);
        assert_eq!(plan.ceiling, 256);
    }

    #[test]
    fn exactly_at_trigger_does_not_compact() {
        let plan = planner().plan(100_000, 80_000);
        assert_eq!(plan.action, PlannedAction::Proceed);
    }

    #[test]
    fn emergency_when_headroom_gone_below_trigger() {
        // 50% used but the safety buffer eats the rest: headroom 428.
        let plan = planner().plan(7_000, 3_500);
        assert_eq!(plan.action, PlannedAction::EmergencyTrim);
        assert_eq!(plan.ceiling, 512);
    }

    #[test]
    fn emergency_trim_keeps_first_and_recent() {
        let history: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        let kept = emergency_trim(&history);
        let contents: Vec<&str> = kept.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m6", "m7", "m8", "m9"]);
    }

    #[test]
    fn emergency_trim_small_histories() {
        let two: Vec<Message> = (0..2).map(|i| Message::user(format!("m{i}"))).collect();
        assert_eq!(emergency_trim(&two).len(), 2);

        let three: Vec<Message> = (0..3).map(|i| Message::user(format!("m{i}"))).collect();
        let kept = emergency_trim(&three);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "m0");
        assert_eq!(kept[1].content, "m2");
    }

    #[test]
    fn stats_count_preamble_and_history() {
        let meter = TokenMeter::heuristic();
        let history = vec![Message::user("a".repeat(400)), Message::assistant("b".repeat(200))];
        let stats = context_stats(&meter, &history, &"p".repeat(400), 1000);
        assert_eq!(stats.total_tokens, 250);
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.available_tokens, 750);
        assert!((stats.usage_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn stats_over_capacity() {
        let meter = TokenMeter::heuristic();
        let stats = context_stats(&meter, &[], &"p".repeat(800), 100);
        assert_eq!(stats.available_tokens, 0);
        assert!(stats.usage_pct > 100.0);
    }
}
