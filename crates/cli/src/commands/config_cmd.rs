//! `windowpack config` — Configuration management commands.

use std::path::Path;
use windowpack_config::AppConfig;
use windowpack_core::SegmentKind;

use super::CmdResult;

pub async fn validate(config_path: Option<&Path>) -> CmdResult {
    println!("🔍 Validating configuration...");

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set WINDOWPACK_API_KEY or OPENAI_API_KEY); summarization is disabled");
    }
    if config.budget.history.min_fraction + config.budget.retrieved_memory.max_fraction > 0.9 {
        warnings.push("History floor plus the retrieved-memory max leave little room for the preamble");
    }
    if config.generation.safety_buffer >= config.total_budget {
        warnings.push("generation.safety_buffer is not smaller than total_budget");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Budget:    {} tokens", config.total_budget);
    for kind in SegmentKind::ALL {
        let b = config.budget.bounds(kind);
        println!(
            "   {:<17} {:>3.0}% – {:>3.0}%",
            kind.as_str(),
            b.min_fraction * 100.0,
            b.max_fraction * 100.0
        );
    }
    println!(
        "   Retrieval: k {} → {} (step {})",
        config.retrieval.initial_k, config.retrieval.max_k, config.retrieval.widen_step
    );
    println!("   Model:     {} @ {}", config.provider.model, config.provider.api_url);
    println!("   Facts:     {} rules", config.compression.fact_rules.len());

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> CmdResult {
    let config = super::load_config(config_path)?;
    println!("{}", config.to_toml());
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> CmdResult {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };
    println!("{}", path.display());
    Ok(())
}

pub async fn default() -> CmdResult {
    println!("{}", AppConfig::default_toml());
    Ok(())
}
