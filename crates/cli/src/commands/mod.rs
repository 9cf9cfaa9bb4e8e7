pub mod assemble;
pub mod compact;
pub mod compress;
pub mod config_cmd;
pub mod plan;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use windowpack_config::AppConfig;
use windowpack_context::{OverflowCompressor, TokenMeter};
use windowpack_core::message::{Conversation, Message};
use windowpack_core::provider::Summarizer;
use windowpack_core::token::{HeuristicCounter, TokenCounter};
use windowpack_providers::{OpenAiCompatProvider, ProviderSummarizer};

pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// The given config file, or `~/.windowpack/config.toml`, with env overrides.
pub fn load_config(path: Option<&Path>) -> CmdResult<AppConfig> {
    let config = match path {
        Some(p) => AppConfig::load_with_env(p),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// A session file holds either an array of messages or a conversation object.
pub fn load_session(path: &Path) -> CmdResult<Vec<Message>> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    if let Ok(messages) = serde_json::from_str::<Vec<Message>>(&raw) {
        return Ok(messages);
    }
    let conversation: Conversation =
        serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(conversation.messages)
}

pub fn read_text(path: Option<&Path>) -> CmdResult<String> {
    match path {
        Some(p) => Ok(std::fs::read_to_string(p).map_err(|e| format!("{}: {e}", p.display()))?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Tokenizer-backed counting when a tokenizer file is given.
pub fn token_counter(tokenizer: Option<&Path>) -> CmdResult<Arc<dyn TokenCounter>> {
    match tokenizer {
        None => Ok(Arc::new(HeuristicCounter)),
        #[cfg(feature = "hf-tokenizer")]
        Some(path) => Ok(Arc::new(windowpack_providers::HfTokenCounter::from_file(path)?)),
        #[cfg(not(feature = "hf-tokenizer"))]
        Some(_) => Err("--tokenizer needs a build with the `hf-tokenizer` feature".into()),
    }
}

/// A provider-backed summarizer, when an API key is configured.
pub fn summarizer(config: &AppConfig, disabled: bool) -> Option<Arc<dyn Summarizer>> {
    if disabled {
        return None;
    }
    if !config.has_api_key() {
        tracing::info!("No API key configured, compression skips summarization");
        return None;
    }
    match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(provider) => Some(Arc::new(ProviderSummarizer::new(
            Arc::new(provider),
            config.provider.model.clone(),
        ))),
        Err(e) => {
            tracing::warn!(error = %e, "Summarizer unavailable");
            None
        }
    }
}

pub fn compressor(
    config: &AppConfig,
    counter: Arc<dyn TokenCounter>,
    no_summarize: bool,
) -> CmdResult<OverflowCompressor> {
    let meter = TokenMeter::new(counter, &config.compression);
    let compressor = OverflowCompressor::new(meter, config.compression.clone())?;
    Ok(match summarizer(config, no_summarize) {
        Some(s) => compressor.with_summarizer(s),
        None => compressor,
    })
}
