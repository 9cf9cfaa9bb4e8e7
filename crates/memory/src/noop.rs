//! No-op knowledge source — disables retrieval entirely.

use async_trait::async_trait;
use windowpack_core::error::KnowledgeError;
use windowpack_core::knowledge::KnowledgeSource;

/// A knowledge source that knows nothing and stores nothing.
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeSource for NoKnowledge {
    fn name(&self) -> &str { "none" }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<String>, KnowledgeError> {
        Ok(Vec::new())
    }
}
