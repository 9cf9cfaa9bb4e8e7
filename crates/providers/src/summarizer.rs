//! Provider-backed summarizer.
//!
//! One request per call, no retries. The overflow compressor owns the
//! deadline and treats every error here as "use the next stage".

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use windowpack_core::error::ProviderError;
use windowpack_core::message::Message;
use windowpack_core::provider::{Provider, ProviderRequest, Summarizer};

/// The fixed condense instruction sent with every request.
pub const CONDENSE_INSTRUCTION: &str =
    "Condense the following result to 2-3 sentences, keeping only concrete facts \
     (names, paths, numbers, versions, URLs). Do not add commentary.";

const SUMMARY_TEMPERATURE: f32 = 0.2;

/// Turns any [`Provider`] into a [`Summarizer`].
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn summarize(
        &self,
        text: &str,
        max_output_tokens: usize,
    ) -> Result<String, ProviderError> {
        let request = ProviderRequest::new(
            &self.model,
            vec![Message::system(CONDENSE_INSTRUCTION), Message::user(text)],
        )
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(u32::try_from(max_output_tokens).unwrap_or(u32::MAX));

        debug!(provider = self.provider.name(), chars = text.len(), max_output_tokens, "Summarizing");

        let response = self.provider.complete(request).await?;
        let summary = response.message.content.trim();
        if summary.is_empty() {
            return Err(ProviderError::EmptyResponse(format!(
                "{} returned an empty summary",
                self.provider.name()
            )));
        }
        Ok(summary.to_string())
    }
}
