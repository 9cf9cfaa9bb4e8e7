//! Knowledge source implementations for windowpack.
//!
//! Every store here implements [`windowpack_core::KnowledgeSource`], the only
//! retrieval surface the allocator sees.

pub mod in_memory;
pub mod layered;
pub mod noop;
pub mod vector;

pub use in_memory::{KeywordKnowledge, read_entries};
pub use layered::LayeredKnowledge;
pub use noop::NoKnowledge;
pub use vector::{VectorKnowledge, cosine_similarity, vector_search};
