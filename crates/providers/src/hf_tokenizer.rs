//! HuggingFace tokenizer-backed token counter.
//!
//! The tokenizer file is loaded explicitly at construction; nothing is
//! downloaded or cached globally.

use std::path::Path;
use windowpack_core::error::TokenizeError;
use windowpack_core::token::TokenCounter;

pub struct HfTokenCounter {
    name: String,
    tokenizer: tokenizers::Tokenizer,
}

impl HfTokenCounter {
    /// Load a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self, TokenizeError> {
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| TokenizeError::Unavailable(format!("{}: {e}", path.display())))?;
        Ok(Self {
            name: format!("hf:{}", path.display()),
            tokenizer,
        })
    }
}

impl TokenCounter for HfTokenCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_count(&self, text: &str) -> Result<usize, TokenizeError> {
        self.tokenizer
            .encode(text, false)
            .map(|enc| enc.get_ids().len())
            .map_err(|e| TokenizeError::EncodingFailed(e.to_string()))
    }
}
