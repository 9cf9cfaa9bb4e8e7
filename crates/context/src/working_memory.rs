//! Working memory — the scratchpad for the task in progress.
//!
//! Holds the current goal, an optional step plan, the result of the last
//! action and free-form notes. It is:
//!
//! - **Caller-owned**: the allocator only reads a snapshot
//! - **Serializable**: the CLI loads it from JSON
//! - **Renderable**: produces the working-memory segment text
//!
//! Working memory is a priority-1 segment: whatever `render()` returns is
//! placed in the assembled preamble byte-for-byte.

use serde::{Deserialize, Serialize};

/// Characters of the last action result shown in the rendered segment.
pub const LAST_ACTION_PREVIEW_CHARS: usize = 200;

// ── Data Structures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// The task the agent is working on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Current plan, if one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    /// Output of the most recent action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_result: Option<String>,

    /// Free-form scratch notes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Ordered steps with progress tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub current_step: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed(String),
}

// ── Implementation ────────────────────────────────────────────────────────

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// Start a new task. Clears the plan and the last action.
    pub fn set_goal(&mut self, goal: &str) {
        self.goal = Some(goal.to_string());
        self.plan = None;
        self.last_action_result = None;
    }

    // ── Plan management ──

    /// Set a new plan from step descriptions. The first step starts in progress.
    pub fn set_plan(&mut self, steps: Vec<String>) {
        let mut plan_steps: Vec<PlanStep> = steps
            .into_iter()
            .map(|desc| PlanStep {
                description: desc,
                status: StepStatus::Pending,
                result: None,
            })
            .collect();
        if let Some(first) = plan_steps.first_mut() {
            first.status = StepStatus::InProgress;
        }
        self.plan = Some(Plan {
            steps: plan_steps,
            current_step: 0,
        });
    }

    /// Advance the plan to the next step, marking the current one completed.
    /// Returns `true` if advancement happened.
    pub fn advance_plan(&mut self, result: Option<String>) -> bool {
        let Some(plan) = &mut self.plan else {
            return false;
        };
        if plan.current_step >= plan.steps.len() {
            return false;
        }
        plan.steps[plan.current_step].status = StepStatus::Completed;
        plan.steps[plan.current_step].result = result;
        plan.current_step += 1;
        if let Some(next) = plan.steps.get_mut(plan.current_step) {
            next.status = StepStatus::InProgress;
        }
        true
    }

    /// Mark the current plan step as failed.
    pub fn fail_plan_step(&mut self, reason: &str) {
        if let Some(plan) = &mut self.plan {
            if let Some(step) = plan.steps.get_mut(plan.current_step) {
                step.status = StepStatus::Failed(reason.to_string());
            }
        }
    }

    /// Check if the plan is complete (all steps done).
    pub fn is_plan_complete(&self) -> bool {
        self.plan
            .as_ref()
            .is_some_and(|p| p.current_step >= p.steps.len())
    }

    // ── Actions and notes ──

    pub fn record_action_result(&mut self, result: &str) {
        self.last_action_result = Some(result.to_string());
    }

    pub fn add_note(&mut self, note: &str) {
        self.notes.push(note.to_string());
    }

    /// Nothing to render.
    pub fn is_empty(&self) -> bool {
        self.goal.as_deref().is_none_or(|g| g.trim().is_empty())
            && self.plan.as_ref().is_none_or(|p| p.steps.is_empty())
            && self.last_action_result.as_deref().is_none_or(|r| r.trim().is_empty())
            && self.notes.is_empty()
    }

    /// The goal, used to steer retrieval toward the task at hand.
    pub fn search_hint(&self) -> Option<&str> {
        self.goal.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }

    // ── Rendering ──

    /// Render as the working-memory segment. Empty memory renders to `""`.
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        if let Some(goal) = self.search_hint() {
            sections.push(format!("CURRENT TASK: {goal}"));
        }

        if let Some(plan) = self.plan.as_ref().filter(|p| !p.steps.is_empty()) {
            let mut out = String::from("CURRENT PLAN:");
            for (i, step) in plan.steps.iter().enumerate() {
                let marker = match &step.status {
                    StepStatus::Completed => "✓",
                    StepStatus::InProgress => "→",
                    StepStatus::Failed(_) => "✗",
                    StepStatus::Pending => " ",
                };
                out.push_str(&format!("\n{}. [{}] {}", i + 1, marker, step.description));
                if let StepStatus::Failed(reason) = &step.status {
                    out.push_str(&format!("\n   Error: {reason}"));
                }
            }
            sections.push(out);
        }

        if let Some(result) = self
            .last_action_result
            .as_deref()
            .filter(|r| !r.trim().is_empty())
        {
            let preview: String = result.chars().take(LAST_ACTION_PREVIEW_CHARS).collect();
            let ellipsis = if result.chars().count() > LAST_ACTION_PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            sections.push(format!("LAST ACTION: {preview}{ellipsis}"));
        }

        if !self.notes.is_empty() {
            let mut out = String::from("NOTES:");
            for note in &self.notes {
                out.push_str(&format!("\n- {note}"));
            }
            sections.push(out);
        }

        sections.join("\n\n")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
