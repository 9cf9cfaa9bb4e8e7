//! Layered knowledge — a global layer shared by every project plus a
//! project-local layer, presented as one source.

use async_trait::async_trait;
use std::sync::Arc;
use windowpack_core::error::KnowledgeError;
use windowpack_core::knowledge::KnowledgeSource;

/// Searches both layers with the same `k` and interleaves the results by
/// rank, global first at each rank. Writes go to the project layer.
pub struct LayeredKnowledge {
    global: Arc<dyn KnowledgeSource>,
    project: Arc<dyn KnowledgeSource>,
}

impl LayeredKnowledge {
    pub fn new(global: Arc<dyn KnowledgeSource>, project: Arc<dyn KnowledgeSource>) -> Self {
        Self { global, project }
    }
}

#[async_trait]
impl KnowledgeSource for LayeredKnowledge {
    fn name(&self) -> &str { "layered" }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, KnowledgeError> {
        // A failing layer degrades to empty as long as the other answers.
        let global = self.global.search(query, k).await;
        let project = self.project.search(query, k).await;

        let (global, project) = match (global, project) {
            (Err(e), Err(_)) => return Err(e),
            (g, p) => {
                if let Err(e) = &g {
                    tracing::warn!(layer = self.global.name(), error = %e, "Global knowledge layer failed");
                }
                if let Err(e) = &p {
                    tracing::warn!(layer = self.project.name(), error = %e, "Project knowledge layer failed");
                }
                (g.unwrap_or_default(), p.unwrap_or_default())
            }
        };

        let mut merged: Vec<String> = Vec::with_capacity(k);
        let longest = global.len().max(project.len());
        for rank in 0..longest {
            for layer in [&global, &project] {
                if let Some(text) = layer.get(rank) {
                    if !merged.contains(text) {
                        merged.push(text.clone());
                    }
                }
            }
        }
        merged.truncate(k);
        Ok(merged)
    }

    async fn remember(&self, text: &str) -> Result<bool, KnowledgeError> {
        self.project.remember(text).await
    }
}
