//! Model backend adapters for windowpack.
//!
//! - [`OpenAiCompatProvider`] implements `Provider` and `Embedder` against any
//!   OpenAI-compatible endpoint.
//! - [`ProviderSummarizer`] turns any `Provider` into the `Summarizer` the
//!   overflow compressor consumes.
//! - `HfTokenCounter` (feature `hf-tokenizer`) counts with a HuggingFace
//!   tokenizer file.

#[cfg(feature = "hf-tokenizer")]
pub mod hf_tokenizer;
pub mod openai_compat;
pub mod summarizer;

#[cfg(feature = "hf-tokenizer")]
pub use hf_tokenizer::HfTokenCounter;
pub use openai_compat::OpenAiCompatProvider;
pub use summarizer::{CONDENSE_INSTRUCTION, ProviderSummarizer};
