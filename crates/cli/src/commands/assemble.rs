//! `windowpack assemble` — Pack a saved session into a token budget.

use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use windowpack_config::AppConfig;
use windowpack_context::{BudgetAllocator, GenerationPlanner, WorkingMemory};
use windowpack_core::knowledge::KnowledgeSource;
use windowpack_memory::{KeywordKnowledge, LayeredKnowledge, NoKnowledge, VectorKnowledge};
use windowpack_providers::OpenAiCompatProvider;

use super::CmdResult;

#[derive(Args)]
pub struct AssembleArgs {
    /// Session JSON (a conversation object or an array of messages)
    pub session: PathBuf,

    /// System preamble file
    #[arg(short, long)]
    pub preamble: Option<PathBuf>,

    /// Working memory JSON (goal, plan, last action, notes)
    #[arg(short, long)]
    pub working_memory: Option<PathBuf>,

    /// Global knowledge file (JSON array of strings or entries)
    #[arg(short, long)]
    pub global: Option<PathBuf>,

    /// Project knowledge file, searched alongside the global one
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Rank knowledge by embeddings from this model instead of keywords
    #[arg(long)]
    pub embed_model: Option<String>,

    /// The current turn's query
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// Total token budget (defaults to the configured budget)
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// HuggingFace tokenizer.json used for counting
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Skip the summarization stage
    #[arg(long)]
    pub no_summarize: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the assembled preamble and history
    #[arg(long)]
    pub show_context: bool,
}

pub async fn run(config_path: Option<&Path>, args: AssembleArgs) -> CmdResult {
    let config = super::load_config(config_path)?;
    let history = super::load_session(&args.session)?;
    let preamble = match &args.preamble {
        Some(p) => super::read_text(Some(p))?,
        None => String::new(),
    };
    let working_memory: WorkingMemory = match &args.working_memory {
        Some(p) => {
            let raw = std::fs::read_to_string(p).map_err(|e| format!("{}: {e}", p.display()))?;
            serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", p.display()))?
        }
        None => WorkingMemory::new(),
    };
    let total_budget = args.budget.unwrap_or(config.total_budget);

    let knowledge = build_knowledge(&config, &args).await?;
    let counter = super::token_counter(args.tokenizer.as_deref())?;
    let allocator = BudgetAllocator::from_config(
        &config,
        counter,
        knowledge,
        super::summarizer(&config, args.no_summarize),
    )?;

    let assembly = allocator
        .assemble(&preamble, &working_memory, &history, &args.query, total_budget)
        .await?;
    let generation = GenerationPlanner::new(config.generation.clone())
        .plan(total_budget, assembly.report.used_tokens);

    if args.json {
        let mut out = serde_json::json!({
            "report": assembly.report,
            "generation": generation,
        });
        if args.show_context {
            out["preamble"] = serde_json::json!(assembly.preamble);
            out["history"] = serde_json::to_value(&assembly.history)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print!("{}", assembly.report);
    println!(
        "  generation ceiling {} ({:?})",
        generation.ceiling, generation.action
    );

    if args.show_context {
        println!();
        println!("── Preamble ──");
        println!("{}", assembly.preamble);
        println!();
        println!("── History ({} messages) ──", assembly.history.len());
        for msg in &assembly.history {
            let marker = if msg.is_compressed() { " (compressed)" } else { "" };
            println!("[{:?}{marker}] {}", msg.role, msg.content);
        }
    }

    Ok(())
}

async fn build_knowledge(
    config: &AppConfig,
    args: &AssembleArgs,
) -> CmdResult<Arc<dyn KnowledgeSource>> {
    let global = match &args.global {
        Some(p) => Some(open_store(config, p, args.embed_model.as_deref()).await?),
        None => None,
    };
    let project = match &args.project {
        Some(p) => Some(open_store(config, p, args.embed_model.as_deref()).await?),
        None => None,
    };

    Ok(match (global, project) {
        (Some(g), Some(p)) => Arc::new(LayeredKnowledge::new(g, p)),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => Arc::new(NoKnowledge),
    })
}

async fn open_store(
    config: &AppConfig,
    path: &Path,
    embed_model: Option<&str>,
) -> CmdResult<Arc<dyn KnowledgeSource>> {
    let Some(model) = embed_model else {
        return Ok(Arc::new(KeywordKnowledge::load_json(path)?));
    };

    let embedder = OpenAiCompatProvider::from_config(&config.provider)?.with_embedding_model(model);
    let store = VectorKnowledge::new(Arc::new(embedder));
    for entry in windowpack_memory::read_entries(path)? {
        store.insert(entry).await?;
    }
    tracing::debug!(path = %path.display(), entries = store.len().await, "Vector knowledge loaded");
    Ok(Arc::new(store))
}
