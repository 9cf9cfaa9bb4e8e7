//! `windowpack compress` — Run the overflow cascade on one piece of text.

use std::path::{Path, PathBuf};

use super::CmdResult;

pub async fn run(
    config_path: Option<&Path>,
    input: Option<PathBuf>,
    ceiling: usize,
    no_summarize: bool,
    json: bool,
) -> CmdResult {
    let config = super::load_config(config_path)?;
    let text = super::read_text(input.as_deref())?;
    let compressor = super::compressor(&config, super::token_counter(None)?, no_summarize)?;

    let outcome = compressor.compress(&text, ceiling).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.text);
        eprintln!(
            "🗜️  {} → {} tokens (ceiling {ceiling}, stage: {}{})",
            outcome.original_tokens,
            outcome.final_tokens,
            outcome.stage,
            if outcome.media_dropped > 0 {
                format!(", {} media dropped", outcome.media_dropped)
            } else {
                String::new()
            }
        );
    }

    Ok(())
}
