//! Knowledge traits — long-term retrieval consumed by the allocator.
//!
//! The allocator only needs `search(query, k) -> ranked texts`. An empty
//! result is a valid "no knowledge" answer, not an error. How the index is
//! organised is entirely the implementation's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KnowledgeError;

/// A single stored piece of knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique ID for this entry
    #[serde(default = "new_id")]
    pub id: String,

    /// The snippet text returned by searches
    pub content: String,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// When this entry was stored
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Optional embedding vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl KnowledgeEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            tags: Vec::new(),
            created_at: Utc::now(),
            embedding: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// The retrieval capability.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// The source name (e.g., "keyword", "vector", "layered", "none").
    fn name(&self) -> &str;

    /// Up to `k` snippets, most relevant first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, KnowledgeError>;

    /// Store a fact for future turns. Returns `false` when nothing was
    /// written (duplicate, or the source is read-only).
    async fn remember(&self, _text: &str) -> Result<bool, KnowledgeError> {
        Ok(false)
    }
}

/// Turns text into an embedding vector.
///
/// Constructed once by the application and passed explicitly to whatever
/// needs it.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnly;

    #[async_trait]
    impl KnowledgeSource for ReadOnly {
        fn name(&self) -> &str {
            "read-only"
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, KnowledgeError> {
            Ok(vec![])
        }
    }

    #[test]
    fn entry_builder() {
        let entry = KnowledgeEntry::new("Project uses tokio 1.40")
            .with_tags(vec!["deps".into()])
            .with_embedding(vec![0.1, 0.2]);
        assert_eq!(entry.tags, vec!["deps".to_string()]);
        assert_eq!(entry.embedding.as_deref(), Some(&[0.1, 0.2][..]));
        assert!(!entry.id.is_empty());
    }

    #[tokio::test]
    async fn remember_defaults_to_not_stored() {
        assert!(!ReadOnly.remember("anything").await.unwrap());
    }
}
