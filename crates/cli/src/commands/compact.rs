//! `windowpack compact` — Session-wide compaction of a saved history.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use windowpack_context::SessionCompactor;
use windowpack_memory::KeywordKnowledge;

use super::CmdResult;

pub async fn run(
    config_path: Option<&Path>,
    session: PathBuf,
    output: Option<PathBuf>,
    knowledge: Option<PathBuf>,
    no_summarize: bool,
) -> CmdResult {
    let config = super::load_config(config_path)?;
    let history = super::load_session(&session)?;
    let compressor = super::compressor(&config, super::token_counter(None)?, no_summarize)?;

    let mut compactor = SessionCompactor::new(Arc::new(compressor), config.compaction.clone());
    let store = match &knowledge {
        Some(path) if path.exists() => Some(Arc::new(KeywordKnowledge::load_json(path)?)),
        Some(_) => Some(Arc::new(KeywordKnowledge::new())),
        None => None,
    };
    if let Some(store) = &store {
        compactor = compactor.with_knowledge(store.clone());
    }

    let outcome = compactor.compact(&history).await;

    let rendered = serde_json::to_string_pretty(&outcome.messages)?;
    match &output {
        Some(path) => std::fs::write(path, rendered).map_err(|e| format!("{}: {e}", path.display()))?,
        None => println!("{rendered}"),
    }
    if let (Some(store), Some(path)) = (&store, &knowledge) {
        store.save_json(path).await?;
    }

    let stats = &outcome.stats;
    eprintln!(
        "✅ Compacted {} → {} messages ({:.1}% reduction)",
        stats.original_count,
        stats.final_count,
        stats.reduction_pct()
    );
    eprintln!(
        "   {} compressed, {} facts saved, {} removed ({} transient, {} empty, {} duplicate)",
        stats.compressed,
        stats.facts_saved,
        stats.removed(),
        stats.removed_transient,
        stats.removed_empty,
        stats.removed_duplicates
    );

    Ok(())
}
