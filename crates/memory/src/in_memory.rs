//! Keyword knowledge store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use windowpack_core::error::KnowledgeError;
use windowpack_core::knowledge::{KnowledgeEntry, KnowledgeSource};

/// An in-memory store ranked by query-term overlap.
///
/// Each entry scores the number of distinct query terms it contains,
/// normalised by entry length so that short, focused snippets win ties over
/// long ones. Entries with no matching term are never returned.
pub struct KeywordKnowledge {
    entries: Arc<RwLock<Vec<KnowledgeEntry>>>,
}

impl KeywordKnowledge {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seed the store with plain snippets.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = texts.into_iter().map(KnowledgeEntry::new).collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Load a JSON file, see [`read_entries`].
    pub fn load_json(path: &Path) -> Result<Self, KnowledgeError> {
        Ok(Self {
            entries: Arc::new(RwLock::new(read_entries(path)?)),
        })
    }

    /// Write all entries as a JSON array of [`KnowledgeEntry`] objects.
    pub async fn save_json(&self, path: &Path) -> Result<(), KnowledgeError> {
        let entries = self.entries.read().await;
        let raw = serde_json::to_string_pretty(&*entries)
            .map_err(|e| KnowledgeError::Storage(e.to_string()))?;
        std::fs::write(path, raw)
            .map_err(|e| KnowledgeError::Storage(format!("{}: {e}", path.display())))
    }

    pub async fn insert(&self, entry: KnowledgeEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Read a JSON file holding either an array of strings or an array of
/// [`KnowledgeEntry`] objects.
pub fn read_entries(path: &Path) -> Result<Vec<KnowledgeEntry>, KnowledgeError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| KnowledgeError::Storage(format!("{}: {e}", path.display())))?;

    if let Ok(texts) = serde_json::from_str::<Vec<String>>(&raw) {
        return Ok(texts.into_iter().map(KnowledgeEntry::new).collect());
    }

    serde_json::from_str(&raw)
        .map_err(|e| KnowledgeError::Storage(format!("{}: {e}", path.display())))
}

impl Default for KeywordKnowledge {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn score(entry: &KnowledgeEntry, query_terms: &[String]) -> f32 {
    let content = entry.content.to_lowercase();
    let hits = query_terms
        .iter()
        .filter(|t| content.contains(t.as_str()))
        .count();
    if hits == 0 {
        return 0.0;
    }
    hits as f32 / (entry.content.len() as f32 / 100.0).max(1.0).sqrt()
}

#[async_trait]
impl KnowledgeSource for KeywordKnowledge {
    fn name(&self) -> &str { "keyword" }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, KnowledgeError> {
        let query_terms = terms(query);
        if query_terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &KnowledgeEntry)> = entries
            .iter()
            .map(|e| (score(e, &query_terms), e))
            .filter(|(s, _)| *s > 0.0)
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, e)| e.content.clone()).collect())
    }

    async fn remember(&self, text: &str) -> Result<bool, KnowledgeError> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.content == text) {
            return Ok(false);
        }
        entries.push(KnowledgeEntry::new(text).with_tags(vec!["fact".into()]));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn search_by_keyword() {
        let mem = KeywordKnowledge::from_texts([
            "Rust is great for systems programming",
            "Python is great for scripting",
            "JavaScript runs in the browser",
        ]);

        let results = mem.search("rust", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("Rust"));
    }

    #[tokio::test]
    async fn more_overlap_ranks_higher() {
        let mem = KeywordKnowledge::from_texts([
            "deploy notes: docker",
            "deploy notes: docker compose on staging",
        ]);

        let results = mem.search("docker compose staging", 5).await.unwrap();
        assert_eq!(results[0], "deploy notes: docker compose on staging");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn search_respects_k() {
        let mem = KeywordKnowledge::from_texts((0..10).map(|i| format!("fact {i} about tokio")));
        let results = mem.search("tokio", 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn empty_query_finds_nothing() {
        let mem = KeywordKnowledge::from_texts(["anything at all"]);
        assert!(mem.search("  ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remember_skips_duplicates() {
        let mem = KeywordKnowledge::new();
        assert!(mem.remember("URL: https://docs.rs").await.unwrap());
        assert!(!mem.remember("URL: https://docs.rs").await.unwrap());
        assert_eq!(mem.len().await, 1);
    }

    #[tokio::test]
    async fn load_json_accepts_string_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["alpha notes", "beta notes"]"#).unwrap();
        let mem = KeywordKnowledge::load_json(file.path()).unwrap();
        assert_eq!(mem.len().await, 2);
    }

    #[tokio::test]
    async fn load_json_accepts_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"content": "gamma notes", "tags": ["x"]}}]"#).unwrap();
        let mem = KeywordKnowledge::load_json(file.path()).unwrap();
        assert_eq!(mem.search("gamma", 1).await.unwrap(), vec!["gamma notes"]);
    }

    #[tokio::test]
    async fn saved_facts_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        let mem = KeywordKnowledge::from_texts(["seed note"]);
        mem.remember("Files: main.rs, lib.rs").await.unwrap();
        mem.save_json(&path).await.unwrap();

        let reloaded = KeywordKnowledge::load_json(&path).unwrap();
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.search("main.rs", 1).await.unwrap(), vec!["Files: main.rs, lib.rs"]);
    }

    #[test]
    fn load_json_missing_file_is_storage_error() {
        let err = KeywordKnowledge::load_json(Path::new("/nonexistent/k.json")).err().unwrap();
        assert!(matches!(err, KnowledgeError::Storage(_)));
    }
}
