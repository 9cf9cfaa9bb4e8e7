//! `windowpack plan` — Generation ceiling and next action for a usage level.

use std::path::{Path, PathBuf};
use windowpack_context::{GenerationPlanner, PlannedAction, TokenMeter, context_stats};

use super::CmdResult;

pub async fn run(
    config_path: Option<&Path>,
    budget: Option<usize>,
    used: Option<usize>,
    session: Option<PathBuf>,
    preamble: Option<PathBuf>,
) -> CmdResult {
    let config = super::load_config(config_path)?;
    let total_budget = budget.unwrap_or(config.total_budget);

    let used = match (&session, used) {
        (Some(path), _) => {
            let history = super::load_session(path)?;
            let preamble = match &preamble {
                Some(p) => super::read_text(Some(p))?,
                None => String::new(),
            };
            let meter = TokenMeter::new(super::token_counter(None)?, &config.compression);
            let stats = context_stats(&meter, &history, &preamble, total_budget);
            println!("📊 Session usage");
            println!("  Messages:   {}", stats.message_count);
            println!("  Tokens:     {} / {} ({:.1}%)", stats.total_tokens, stats.capacity, stats.usage_pct);
            println!("  Available:  {}", stats.available_tokens);
            stats.total_tokens
        }
        (None, Some(used)) => used,
        (None, None) => return Err("either --used or --session is required".into()),
    };

    let plan = GenerationPlanner::new(config.generation.clone()).plan(total_budget, used);
    println!("🎯 Generation plan");
    println!("  Ceiling:    {} tokens", plan.ceiling);
    println!("  Usage:      {:.1}%", plan.utilization * 100.0);
    let action = match plan.action {
        PlannedAction::Proceed => "proceed",
        PlannedAction::Compact => "compact the session before the next turn",
        PlannedAction::EmergencyTrim => "emergency trim: keep the first and most recent messages",
    };
    println!("  Action:     {action}");

    Ok(())
}
