//! End-to-end integration tests for the windowpack pipeline.
//!
//! These tests drive the public crate APIs together: provider-backed
//! summarization inside the overflow cascade, layered retrieval feeding the
//! allocator, session compaction writing facts back to a knowledge store,
//! and the generation planner reading the allocation report.

use std::sync::Arc;

use windowpack_config::{AppConfig, CompactionConfig, CompressionConfig};
use windowpack_context::allocator::MEMORY_HEADER;
use windowpack_context::{
    BudgetAllocator, CompressionStage, GenerationPlanner, OverflowCompressor, PlannedAction,
    SessionCompactor, TokenMeter, WorkingMemory, emergency_trim,
};
use windowpack_core::error::ProviderError;
use windowpack_core::knowledge::KnowledgeSource;
use windowpack_core::message::{Message, Role};
use windowpack_core::provider::{Provider, ProviderRequest, ProviderResponse, Summarizer, Usage};
use windowpack_core::segment::SegmentKind;
use windowpack_core::token::HeuristicCounter;
use windowpack_memory::{KeywordKnowledge, LayeredKnowledge, NoKnowledge};
use windowpack_providers::{CONDENSE_INSTRUCTION, ProviderSummarizer};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence and records
/// every request it sees.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<Result<String, ProviderError>>>,
    requests: std::sync::Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string())])
    }

    fn failing() -> Self {
        Self::new(vec![Err(ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        })])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let idx = requests.len().min(responses.len().saturating_sub(1));
        requests.push(request);
        let content = responses
            .get(idx)
            .cloned()
            .unwrap_or_else(|| Ok("(no scripted response)".into()))?;
        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage: Some(Usage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            }),
            model: "mock-model".into(),
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn summarizer(provider: &Arc<ScriptedProvider>) -> Arc<dyn Summarizer> {
    Arc::new(ProviderSummarizer::new(provider.clone(), "mock-model"))
}

fn compressor(summarizer: Option<Arc<dyn Summarizer>>) -> OverflowCompressor {
    let config = CompressionConfig::default();
    let meter = TokenMeter::new(Arc::new(HeuristicCounter), &config);
    let compressor = OverflowCompressor::new(meter, config).unwrap();
    match summarizer {
        Some(s) => compressor.with_summarizer(s),
        None => compressor,
    }
}

fn allocator(knowledge: Arc<dyn KnowledgeSource>) -> BudgetAllocator {
    BudgetAllocator::from_config(
        &AppConfig::default(),
        Arc::new(HeuristicCounter),
        knowledge,
        None,
    )
    .unwrap()
}

/// `n` alternating user/assistant turns of exactly 100 heuristic tokens.
fn history(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            let text = format!("{i:03}{}", "h".repeat(397));
            if i % 2 == 0 {
                Message::user(text)
            } else {
                Message::assistant(text)
            }
        })
        .collect()
}

fn layered_knowledge() -> Arc<dyn KnowledgeSource> {
    let global = KeywordKnowledge::from_texts([
        "Production deploys run through deploy.sh on the bastion host",
        "The cafeteria closes at 3pm on Fridays",
    ]);
    let project = KeywordKnowledge::from_texts(["This service is built on tokio 1.40"]);
    Arc::new(LayeredKnowledge::new(Arc::new(global), Arc::new(project)))
}

// ── Compression with a real summarizer adapter ───────────────────────────

#[tokio::test]
async fn e2e_provider_summary_replaces_long_output() {
    let provider = Arc::new(ScriptedProvider::text("  Build log: 3 crates compiled, 0 warnings.  "));
    let c = compressor(Some(summarizer(&provider)));
    let log = "compiling crate with optimisations enabled ".repeat(100);

    let outcome = c.compress(&log, 50).await;

    assert_eq!(outcome.stage, CompressionStage::Summary);
    assert_eq!(outcome.text, "Build log: 3 crates compiled, 0 warnings.");
    assert!(outcome.fits(50));
    assert_eq!(provider.calls(), 1);

    let request = provider.last_request();
    assert_eq!(request.max_tokens, Some(50));
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].content, CONDENSE_INSTRUCTION);
    assert_eq!(request.messages[1].content.chars().count(), 3000);
}

#[tokio::test]
async fn e2e_provider_failure_falls_back_to_facts() {
    let provider = Arc::new(ScriptedProvider::failing());
    let c = compressor(Some(summarizer(&provider)));
    let output = format!(
        "Observation: fetched https://svc.example.org/export {}",
        "lorem ipsum dolor ".repeat(100)
    );

    let outcome = c.compress(&output, 40).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.stage, CompressionStage::Facts);
    assert!(outcome.text.contains("URL: https://svc.example.org/export"));
    assert!(outcome.fits(40));
}

#[tokio::test]
async fn e2e_empty_summary_is_treated_as_failure() {
    let provider = Arc::new(ScriptedProvider::text("   "));
    let c = compressor(Some(summarizer(&provider)));
    let text = "plain words without any extractable facts ".repeat(50);

    let outcome = c.compress(&text, 30).await;

    assert_ne!(outcome.stage, CompressionStage::Summary);
    assert!(outcome.fits(30));
    assert!(!outcome.text.trim().is_empty());
}

#[tokio::test]
async fn e2e_short_content_never_reaches_the_provider() {
    let provider = Arc::new(ScriptedProvider::text("unused"));
    let c = compressor(Some(summarizer(&provider)));

    let outcome = c.compress("ok", 10).await;

    assert_eq!(outcome.stage, CompressionStage::Unchanged);
    assert_eq!(outcome.text, "ok");
    assert_eq!(provider.calls(), 0);
}

// ── Assembly ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_assembly_with_layered_knowledge() {
    let alloc = allocator(layered_knowledge());
    let wm = WorkingMemory::new().with_goal("Ship release");
    let h = history(20);

    let assembly = alloc
        .assemble("You are a deployment assistant.", &wm, &h, "deploy tokio service", 4000)
        .await
        .unwrap();

    assert!(assembly.preamble.starts_with("You are a deployment assistant."));
    assert!(assembly.preamble.contains(MEMORY_HEADER));
    assert!(assembly.preamble.contains("deploy.sh on the bastion host"));
    assert!(assembly.preamble.contains("tokio 1.40"));
    assert!(!assembly.preamble.contains("cafeteria"));
    assert!(assembly.preamble.ends_with(&wm.render()));

    // Plenty of room: every message survives untouched.
    assert_eq!(assembly.history, h);
    let report = &assembly.report;
    assert_eq!(report.trimmed_count, 0);
    assert_eq!(report.compressed_count, 0);
    assert_eq!(report.retrieved_results, 2);
    assert!(!report.over_budget);
    assert!(report.used_tokens + report.tokens(SegmentKind::Reserve) <= 4000);
}

#[tokio::test]
async fn e2e_tight_budget_keeps_newest_history() {
    let alloc = allocator(Arc::new(NoKnowledge));
    let h = history(40);

    let assembly = alloc
        .assemble("System.", &WorkingMemory::new(), &h, "", 2000)
        .await
        .unwrap();

    let report = &assembly.report;
    assert!(report.trimmed_count > 0);
    assert_eq!(report.trimmed_count + assembly.history.len(), 40);
    assert!(report.tokens(SegmentKind::History) <= report.history_budget);
    assert_eq!(assembly.history.last().map(|m| &m.id), h.last().map(|m| &m.id));
    assert!(!report.over_budget);

    // Kept messages are a contiguous newest suffix, oldest first.
    let first_kept = h.len() - assembly.history.len();
    for (kept, original) in assembly.history.iter().zip(&h[first_kept..]) {
        assert_eq!(kept.id, original.id);
    }
}

#[tokio::test]
async fn e2e_oversized_preamble_reports_over_budget() {
    let alloc = allocator(layered_knowledge());
    let preamble = "p".repeat(2000);

    let assembly = alloc
        .assemble(&preamble, &WorkingMemory::new(), &history(5), "deploy", 300)
        .await
        .unwrap();

    assert_eq!(assembly.preamble, preamble);
    assert!(assembly.report.over_budget);
    assert!(!assembly.report.warnings.is_empty());
}

#[tokio::test]
async fn e2e_report_serializes_for_the_cli() {
    let alloc = allocator(layered_knowledge());
    let assembly = alloc
        .assemble("System.", &WorkingMemory::new(), &history(4), "tokio", 4000)
        .await
        .unwrap();

    let json = serde_json::to_value(&assembly.report).unwrap();
    assert_eq!(json["total_budget"], 4000);
    assert!(json["segments"].is_array());
    assert!(json["ledger"].is_array());
    assert_eq!(json["over_budget"], false);
}

// ── Generation planning ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_generation_ceiling_from_assembly() {
    let alloc = allocator(Arc::new(NoKnowledge));
    let assembly = alloc
        .assemble("System.", &WorkingMemory::new(), &history(10), "", 16_000)
        .await
        .unwrap();

    let planner = GenerationPlanner::new(AppConfig::default().generation);
    let plan = planner.plan(16_000, assembly.report.used_tokens);

    assert_eq!(plan.action, PlannedAction::Proceed);
    assert_eq!(plan.ceiling, 4096);
}

#[tokio::test]
async fn e2e_heavy_session_plans_compaction() {
    let planner = GenerationPlanner::new(AppConfig::default().generation);
    let plan = planner.plan(10_000, 9_000);
    assert_eq!(plan.action, PlannedAction::Compact);
    assert_eq!(plan.ceiling, 256);

    let trimmed = emergency_trim(&history(8));
    assert_eq!(trimmed.len(), 4);
    assert!(trimmed[0].content.starts_with("000"));
    assert!(trimmed[3].content.starts_with("007"));
}

// ── Session compaction ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_compaction_feeds_later_retrieval() {
    let provider = Arc::new(ScriptedProvider::text("Fetched 200 rows from the export endpoint."));
    let knowledge = Arc::new(KeywordKnowledge::new());
    let compactor = SessionCompactor::new(
        Arc::new(compressor(Some(summarizer(&provider)))),
        CompactionConfig::default(),
    )
    .with_knowledge(knowledge.clone());

    let big = format!(
        "Observation: fetched https://svc.example.org/export {}",
        "row data ".repeat(200)
    );
    let session = vec![
        Message::user("Export the customer table"),
        Message::assistant("Thought: fetch it\nAction: http_get"),
        Message::tool(big.clone()),
        Message::assistant("FORMAT ERROR: missing Action Input"),
        Message::tool("Observation:"),
        Message::tool(big),
        Message::assistant("Final Answer: exported"),
    ];

    let outcome = compactor.compact(&session).await;

    let stats = &outcome.stats;
    assert_eq!(stats.original_count, 7);
    assert_eq!(stats.compressed, 2);
    assert_eq!(stats.removed_transient, 1);
    assert_eq!(stats.removed_empty, 1);
    assert_eq!(stats.removed_duplicates, 1);
    assert_eq!(stats.facts_saved, 1);
    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(outcome.messages[0], session[0]);
    assert_eq!(
        outcome.messages[2].content,
        "Fetched 200 rows from the export endpoint."
    );
    assert!(outcome.messages[2].is_compressed());

    // The harvested fact is retrievable on later turns.
    let found = knowledge.search("svc example export", 3).await.unwrap();
    assert_eq!(found, vec!["URL: https://svc.example.org/export".to_string()]);

    // And it survives a save/reload cycle.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("facts.json");
    knowledge.save_json(&path).await.unwrap();
    let reloaded = KeywordKnowledge::load_json(&path).unwrap();
    assert_eq!(reloaded.len().await, 1);
}

#[tokio::test]
async fn e2e_compacted_session_fits_where_original_did_not() {
    let provider = Arc::new(ScriptedProvider::text("Short summary of a long tool result."));
    let compactor = SessionCompactor::new(
        Arc::new(compressor(Some(summarizer(&provider)))),
        CompactionConfig::default(),
    );
    let session: Vec<Message> = std::iter::once(Message::user("Summarise the logs"))
        .chain((0..6).map(|i| Message::tool(format!("Observation: log chunk {i} {}", "x".repeat(4000)))))
        .collect();

    let meter = TokenMeter::heuristic();
    let before = meter.count_messages(&session);
    let outcome = compactor.compact(&session).await;
    let after = meter.count_messages(&outcome.messages);

    assert_eq!(outcome.stats.compressed, 6);
    assert!(after < before / 10);
}
