//! History trimming — newest-first sliding window with one compression.
//!
//! Walks the conversation from the most recent message backward, keeping
//! whole messages while they fit. The first message that does not fit is
//! compressed into the remaining space when there is enough slack to make it
//! worthwhile; either way the walk stops there and every older message is
//! dropped.
//!
//! Each visited message is counted once per pass; the boundary message's
//! count is handed to the compressor rather than measured again. Messages
//! older than the stop point are never counted.

use std::sync::Arc;
use tracing::debug;
use windowpack_core::message::Message;

use crate::compressor::OverflowCompressor;

/// Messages kept for this turn, oldest first.
#[derive(Debug, Clone, Default)]
pub struct TrimOutcome {
    pub kept: Vec<Message>,
    /// 0 or 1.
    pub compressed_count: usize,
    /// Messages dropped from the head of the history.
    pub trimmed_count: usize,
    pub tokens_used: usize,
}

pub struct HistoryTrimmer {
    compressor: Arc<OverflowCompressor>,
    compress_slack_fraction: f64,
}

impl HistoryTrimmer {
    pub fn new(compressor: Arc<OverflowCompressor>, compress_slack_fraction: f64) -> Self {
        Self {
            compressor,
            compress_slack_fraction,
        }
    }

    /// Fit `history` into `budget` tokens. The input is never modified; a
    /// compressed message is a new [`Message`] with the same id and role.
    pub async fn trim(&self, history: &[Message], budget: usize) -> TrimOutcome {
        let meter = self.compressor.meter();
        let slack = (budget as f64 * self.compress_slack_fraction).floor() as usize;

        let mut kept: Vec<Message> = Vec::new();
        let mut used = 0;
        let mut compressed_count = 0;

        for msg in history.iter().rev() {
            let tokens = meter.count_message(msg);
            if used + tokens <= budget {
                kept.push(msg.clone());
                used += tokens;
                continue;
            }

            let remaining = budget - used;
            if remaining > slack && tokens > remaining {
                let outcome = self
                    .compressor
                    .compress_counted(&msg.content, tokens, remaining)
                    .await;
                if outcome.fits(remaining) {
                    debug!(
                        message_id = %msg.id,
                        stage = %outcome.stage,
                        from = tokens,
                        to = outcome.final_tokens,
                        "Compressed boundary message"
                    );
                    used += outcome.final_tokens;
                    kept.push(msg.compressed_copy(outcome.text));
                    compressed_count = 1;
                }
            }
            break;
        }

        kept.reverse();
        let trimmed_count = history.len() - kept.len();
        if trimmed_count > 0 {
            debug!(trimmed_count, compressed_count, budget, used, "Oldest turns dropped (sliding window)");
        }

        TrimOutcome {
            kept,
            compressed_count,
            trimmed_count,
            tokens_used: used,
        }
    }
}
