//! Configuration loading, validation, and management for windowpack.
//!
//! Loads configuration from `~/.windowpack/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Every percentage the allocator uses is policy, so it lives here as a named
//! field rather than as a constant in the algorithm. The structs are plain
//! data; the allocator takes them by value at construction and never mutates
//! them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use windowpack_core::SegmentKind;

/// The root configuration structure.
///
/// Maps directly to `~/.windowpack/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model context capacity used when the caller gives none
    #[serde(default = "default_total_budget")]
    pub total_budget: usize,

    /// Segment tiers and per-turn allocation policy
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Adaptive retrieval sizing
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Overflow compression cascade
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Dynamic generation ceiling
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Session-wide compaction pass
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Model backend used for summarization
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_total_budget() -> usize {
    24576
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── Budget ──────────────────────────────────────────────────────────────

/// Soft bounds of one segment as fractions of the total budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentBounds {
    pub min_fraction: f64,
    pub max_fraction: f64,
}

impl SegmentBounds {
    pub const fn new(min_fraction: f64, max_fraction: f64) -> Self {
        Self {
            min_fraction,
            max_fraction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_preamble_bounds")]
    pub preamble: SegmentBounds,

    #[serde(default = "default_working_memory_bounds")]
    pub working_memory: SegmentBounds,

    #[serde(default = "default_retrieved_memory_bounds")]
    pub retrieved_memory: SegmentBounds,

    #[serde(default = "default_history_bounds")]
    pub history: SegmentBounds,

    /// Only `min_fraction` is reserved; `max_fraction` is reported.
    #[serde(default = "default_reserve_bounds")]
    pub reserve: SegmentBounds,

    /// Share of the total budget retrieval aims for
    #[serde(default = "default_memory_target_fraction")]
    pub memory_target_fraction: f64,

    /// Warn when preamble + working memory exceed this share
    #[serde(default = "default_critical_warn_fraction")]
    pub critical_warn_fraction: f64,

    /// The trimmer compresses only when `remaining > budget * this`
    #[serde(default = "default_compress_slack_fraction")]
    pub compress_slack_fraction: f64,

    /// Unused history headroom below this many tokens is not recorded
    #[serde(default = "default_unused_report_threshold")]
    pub unused_report_threshold: usize,

    /// Joins preamble, memory block and working memory
    #[serde(default = "default_segment_separator")]
    pub segment_separator: String,
}

fn default_preamble_bounds() -> SegmentBounds {
    SegmentBounds::new(0.10, 0.20)
}
fn default_working_memory_bounds() -> SegmentBounds {
    SegmentBounds::new(0.05, 0.15)
}
fn default_retrieved_memory_bounds() -> SegmentBounds {
    SegmentBounds::new(0.10, 0.30)
}
fn default_history_bounds() -> SegmentBounds {
    SegmentBounds::new(0.30, 0.70)
}
fn default_reserve_bounds() -> SegmentBounds {
    SegmentBounds::new(0.05, 0.10)
}
fn default_memory_target_fraction() -> f64 {
    0.20
}
fn default_critical_warn_fraction() -> f64 {
    0.50
}
fn default_compress_slack_fraction() -> f64 {
    0.20
}
fn default_unused_report_threshold() -> usize {
    100
}
fn default_segment_separator() -> String {
    "\n\n---\n\n".into()
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            preamble: default_preamble_bounds(),
            working_memory: default_working_memory_bounds(),
            retrieved_memory: default_retrieved_memory_bounds(),
            history: default_history_bounds(),
            reserve: default_reserve_bounds(),
            memory_target_fraction: default_memory_target_fraction(),
            critical_warn_fraction: default_critical_warn_fraction(),
            compress_slack_fraction: default_compress_slack_fraction(),
            unused_report_threshold: default_unused_report_threshold(),
            segment_separator: default_segment_separator(),
        }
    }
}

impl BudgetConfig {
    /// Bounds for a segment kind.
    pub fn bounds(&self, kind: SegmentKind) -> SegmentBounds {
        match kind {
            SegmentKind::Preamble => self.preamble,
            SegmentKind::WorkingMemory => self.working_memory,
            SegmentKind::RetrievedMemory => self.retrieved_memory,
            SegmentKind::History => self.history,
            SegmentKind::Reserve => self.reserve,
        }
    }
}

// ── Retrieval ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// First `k` asked of the knowledge source
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,

    /// How much `k` grows per re-query
    #[serde(default = "default_widen_step")]
    pub widen_step: usize,

    /// Hard maximum `k`
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Re-query while memory tokens < target * this
    #[serde(default = "default_widen_below_fraction")]
    pub widen_below_fraction: f64,
}

fn default_initial_k() -> usize {
    2
}
fn default_widen_step() -> usize {
    3
}
fn default_max_k() -> usize {
    8
}
fn default_widen_below_fraction() -> f64 {
    0.60
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            initial_k: default_initial_k(),
            widen_step: default_widen_step(),
            max_k: default_max_k(),
            widen_below_fraction: default_widen_below_fraction(),
        }
    }
}

// ── Compression ─────────────────────────────────────────────────────────

/// One fact-extraction category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRuleConfig {
    /// Prefix written before the matches, e.g. `URL`
    pub label: String,

    /// Regular expression (Rust `regex` syntax)
    pub pattern: String,

    /// Maximum distinct matches kept
    #[serde(default = "default_fact_cap")]
    pub cap: usize,

    #[serde(default)]
    pub case_insensitive: bool,

    /// Lowercase matches before de-duplicating
    #[serde(default)]
    pub lowercase: bool,

    /// Capture group to keep (0 = whole match)
    #[serde(default)]
    pub group: usize,
}

fn default_fact_cap() -> usize {
    3
}

impl FactRuleConfig {
    pub fn new(label: &str, pattern: &str, cap: usize) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
            cap,
            case_insensitive: false,
            lowercase: false,
            group: 0,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn lowercased(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }
}

/// URLs, files, versions, technologies, dates, in that order.
pub fn default_fact_rules() -> Vec<FactRuleConfig> {
    vec![
        FactRuleConfig::new("URL", r#"https?://[^\s<>"{}|\\^`\[\]]+"#, 3),
        FactRuleConfig::new(
            "Files",
            r"\b[\w-]+\.(?:py|rs|txt|md|json|yaml|yml|toml|cfg|ini|sh|bash|js|ts|html|css|sql)\b",
            3,
        )
        .case_insensitive(),
        FactRuleConfig::new(
            "Versions",
            r"\b(?:python|node|rust|v\.?|version|ver\.?)\s*(\d+\.\d+(?:\.\d+)?)\b",
            2,
        )
        .case_insensitive()
        .with_group(1),
        FactRuleConfig::new(
            "Technologies",
            r"\b(?:Python|Rust|JavaScript|TypeScript|Node\.js|React|Vue|Angular|Django|Flask|FastAPI|Docker|Kubernetes|PostgreSQL|MySQL|MongoDB|Redis)\b",
            3,
        )
        .case_insensitive()
        .lowercased(),
        FactRuleConfig::new(
            "Dates",
            r"\b(?:\d{4}-\d{2}-\d{2}|\d{2}\.\d{2}\.\d{4}|\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4})\b",
            2,
        )
        .case_insensitive(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Stage 1 marker cap
    #[serde(default = "default_max_media_markers")]
    pub max_media_markers: usize,

    /// Fixed token cost per marker
    #[serde(default = "default_media_marker_tokens")]
    pub media_marker_tokens: usize,

    /// Recognised marker kinds (empty = any kind)
    #[serde(default = "default_media_kinds")]
    pub media_kinds: Vec<String>,

    /// Characters of input the summarizer may read
    #[serde(default = "default_summary_input_chars")]
    pub summary_input_chars: usize,

    /// Upper bound on the summary's own length
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,

    /// Deadline for a single summarizer call
    #[serde(default = "default_summary_timeout_ms")]
    pub summary_timeout_ms: u64,

    /// Shorter text is never sent to the summarizer
    #[serde(default = "default_summarize_min_chars")]
    pub summarize_min_chars: usize,

    /// Length of the stage 3 fallback excerpt
    #[serde(default = "default_fallback_chars")]
    pub fallback_chars: usize,

    /// Stage 4 character budget per token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Leading labels removed from the stage 3 fallback excerpt
    #[serde(default = "default_strip_labels")]
    pub strip_labels: Vec<String>,

    /// Joins fact categories
    #[serde(default = "default_fact_separator")]
    pub fact_separator: String,

    /// Stage 3 categories in priority order
    #[serde(default = "default_fact_rules")]
    pub fact_rules: Vec<FactRuleConfig>,
}

fn default_max_media_markers() -> usize {
    2
}
fn default_media_marker_tokens() -> usize {
    85
}
fn default_media_kinds() -> Vec<String> {
    vec![
        "image".into(),
        "img".into(),
        "audio".into(),
        "video".into(),
        "file".into(),
    ]
}
fn default_summary_input_chars() -> usize {
    3000
}
fn default_summary_max_tokens() -> usize {
    256
}
fn default_summary_timeout_ms() -> u64 {
    5000
}
fn default_summarize_min_chars() -> usize {
    400
}
fn default_fallback_chars() -> usize {
    150
}
fn default_chars_per_token() -> usize {
    4
}
fn default_strip_labels() -> Vec<String> {
    vec!["Observation:".into()]
}
fn default_fact_separator() -> String {
    " | ".into()
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_media_markers: default_max_media_markers(),
            media_marker_tokens: default_media_marker_tokens(),
            media_kinds: default_media_kinds(),
            summary_input_chars: default_summary_input_chars(),
            summary_max_tokens: default_summary_max_tokens(),
            summary_timeout_ms: default_summary_timeout_ms(),
            summarize_min_chars: default_summarize_min_chars(),
            fallback_chars: default_fallback_chars(),
            chars_per_token: default_chars_per_token(),
            strip_labels: default_strip_labels(),
            fact_separator: default_fact_separator(),
            fact_rules: default_fact_rules(),
        }
    }
}

// ── Generation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: usize,

    #[serde(default = "default_generation_floor")]
    pub floor: usize,

    #[serde(default = "default_generation_cap")]
    pub cap: usize,

    /// Session-wide compaction fires above this utilization
    #[serde(default = "default_compaction_trigger")]
    pub compaction_trigger: f64,

    /// Emergency trim below this much generation headroom
    #[serde(default = "default_emergency_headroom")]
    pub emergency_headroom: usize,
}

fn default_safety_buffer() -> usize {
    3072
}
fn default_generation_floor() -> usize {
    256
}
fn default_generation_cap() -> usize {
    4096
}
fn default_compaction_trigger() -> f64 {
    0.80
}
fn default_emergency_headroom() -> usize {
    512
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            safety_buffer: default_safety_buffer(),
            floor: default_generation_floor(),
            cap: default_generation_cap(),
            compaction_trigger: default_compaction_trigger(),
            emergency_headroom: default_emergency_headroom(),
        }
    }
}

// ── Compaction ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Messages longer than this are compressed
    #[serde(default = "default_long_message_chars")]
    pub long_message_chars: usize,

    /// Ceiling used when compressing a long message
    #[serde(default = "default_compressed_message_tokens")]
    pub compressed_message_tokens: usize,

    /// Messages sharing this many leading characters are duplicates
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,

    /// Substrings identifying transient error messages
    #[serde(default = "default_transient_markers")]
    pub transient_markers: Vec<String>,

    /// Prefix identifying tool observations
    #[serde(default = "default_observation_prefix")]
    pub observation_prefix: String,

    /// Write extracted facts to the knowledge source
    #[serde(default = "default_true")]
    pub harvest_facts: bool,

    /// Facts no longer than this are not stored
    #[serde(default = "default_min_fact_chars")]
    pub min_fact_chars: usize,
}

fn default_long_message_chars() -> usize {
    1500
}
fn default_compressed_message_tokens() -> usize {
    256
}
fn default_dedup_prefix_chars() -> usize {
    200
}
fn default_transient_markers() -> Vec<String> {
    vec![
        "FORMAT ERROR".into(),
        "does NOT match the format".into(),
        "REQUIRED FORMAT:".into(),
        "CRITICAL FORMAT ERROR".into(),
    ]
}
fn default_observation_prefix() -> String {
    "Observation:".into()
}
fn default_true() -> bool {
    true
}
fn default_min_fact_chars() -> usize {
    20
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            long_message_chars: default_long_message_chars(),
            compressed_message_tokens: default_compressed_message_tokens(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
            transient_markers: default_transient_markers(),
            observation_prefix: default_observation_prefix(),
            harvest_facts: true,
            min_fact_chars: default_min_fact_chars(),
        }
    }
}

// ── Provider ────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Loading ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.windowpack/config.toml).
    ///
    /// Environment overrides:
    /// - `WINDOWPACK_API_KEY` (then `OPENAI_API_KEY`) when no key is configured
    /// - `WINDOWPACK_API_URL`
    /// - `WINDOWPACK_MODEL`
    /// - `WINDOWPACK_TOTAL_BUDGET`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load a specific file, then apply the same environment overrides as
    /// [`load`](Self::load).
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("WINDOWPACK_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("WINDOWPACK_API_URL") {
            self.provider.api_url = url;
        }

        if let Ok(model) = std::env::var("WINDOWPACK_MODEL") {
            self.provider.model = model;
        }

        if let Ok(raw) = std::env::var("WINDOWPACK_TOTAL_BUDGET") {
            self.total_budget = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "WINDOWPACK_TOTAL_BUDGET must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".windowpack")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_budget == 0 {
            return Err(ConfigError::ValidationError(
                "total_budget must be greater than 0".into(),
            ));
        }

        for kind in SegmentKind::ALL {
            let b = self.budget.bounds(kind);
            if !(0.0..=1.0).contains(&b.min_fraction)
                || !(0.0..=1.0).contains(&b.max_fraction)
                || b.min_fraction > b.max_fraction
            {
                return Err(ConfigError::ValidationError(format!(
                    "budget.{}: expected 0 <= min_fraction <= max_fraction <= 1, got {} / {}",
                    kind.as_str().replace('-', "_"),
                    b.min_fraction,
                    b.max_fraction
                )));
            }
        }

        let floor_sum = self.budget.preamble.min_fraction
            + self.budget.working_memory.min_fraction
            + self.budget.reserve.min_fraction
            + self.budget.history.min_fraction;
        if floor_sum > 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "preamble, working_memory, reserve and history minimums sum to {floor_sum:.2} (> 1.0)"
            )));
        }

        for (name, value) in [
            ("memory_target_fraction", self.budget.memory_target_fraction),
            ("critical_warn_fraction", self.budget.critical_warn_fraction),
            ("compress_slack_fraction", self.budget.compress_slack_fraction),
            ("retrieval.widen_below_fraction", self.retrieval.widen_below_fraction),
            ("generation.compaction_trigger", self.generation.compaction_trigger),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }

        if self.retrieval.initial_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.initial_k must be at least 1".into(),
            ));
        }
        if self.retrieval.initial_k > self.retrieval.max_k {
            return Err(ConfigError::ValidationError(
                "retrieval.initial_k must be <= retrieval.max_k".into(),
            ));
        }
        if self.retrieval.widen_step == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.widen_step must be at least 1".into(),
            ));
        }

        if self.generation.floor > self.generation.cap {
            return Err(ConfigError::ValidationError(
                "generation.floor must be <= generation.cap".into(),
            ));
        }

        if self.compression.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "compression.chars_per_token must be at least 1".into(),
            ));
        }

        for rule in &self.compression.fact_rules {
            regex::RegexBuilder::new(&rule.pattern)
                .case_insensitive(rule.case_insensitive)
                .build()
                .map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "fact rule '{}' has an invalid pattern: {e}",
                        rule.label
                    ))
                })?;
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    /// Render this configuration as TOML. Secrets are left out.
    pub fn to_toml(&self) -> String {
        let mut shown = self.clone();
        shown.provider.api_key = None;
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            total_budget: default_total_budget(),
            budget: BudgetConfig::default(),
            retrieval: RetrievalConfig::default(),
            compression: CompressionConfig::default(),
            generation: GenerationConfig::default(),
            compaction: CompactionConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for windowpack_core::Error {
    fn from(e: ConfigError) -> Self {
        windowpack_core::Error::config(e.to_string())
    }
}
