//! Embedding-backed knowledge store.
//!
//! Pure-Rust cosine ranking over entries whose embeddings are produced by an
//! injected [`Embedder`]. The embedder is built once by the application and
//! handed to the store; the store never creates one itself.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use windowpack_core::error::KnowledgeError;
use windowpack_core::knowledge::{Embedder, KnowledgeEntry, KnowledgeSource};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank entries by cosine similarity to a query embedding.
///
/// Returns `(similarity, entry)` pairs sorted by descending similarity. Only
/// entries that have embeddings and meet the minimum score are included.
pub fn vector_search<'a>(
    entries: &'a [KnowledgeEntry],
    query_embedding: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<(f32, &'a KnowledgeEntry)> {
    let mut scored: Vec<(f32, &KnowledgeEntry)> = entries
        .iter()
        .filter_map(|entry| {
            let emb = entry.embedding.as_ref()?;
            let sim = cosine_similarity(emb, query_embedding);
            (sim >= min_score).then_some((sim, entry))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// A knowledge source ranked by embedding similarity.
pub struct VectorKnowledge {
    entries: RwLock<Vec<KnowledgeEntry>>,
    embedder: Arc<dyn Embedder>,
    min_score: f32,
}

impl VectorKnowledge {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder,
            min_score: 0.0,
        }
    }

    /// Drop results below this similarity.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Embed and store a snippet.
    pub async fn add(&self, text: &str) -> Result<(), KnowledgeError> {
        self.insert(KnowledgeEntry::new(text)).await
    }

    /// Store an entry, embedding it unless it already carries a vector.
    pub async fn insert(&self, entry: KnowledgeEntry) -> Result<(), KnowledgeError> {
        let entry = match entry.embedding {
            Some(_) => entry,
            None => {
                let embedding = self.embedder.embed(&entry.content).await?;
                entry.with_embedding(embedding)
            }
        };
        self.entries.write().await.push(entry);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeSource for VectorKnowledge {
    fn name(&self) -> &str { "vector" }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, KnowledgeError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query).await?;
        let entries = self.entries.read().await;
        Ok(vector_search(&entries, &query_embedding, k, self.min_score)
            .into_iter()
            .map(|(_, e)| e.content.clone())
            .collect())
    }

    async fn remember(&self, text: &str) -> Result<bool, KnowledgeError> {
        if self.entries.read().await.iter().any(|e| e.content == text) {
            return Ok(false);
        }
        self.add(text).await?;
        Ok(true)
    }
}
