//! # windowpack Core
//!
//! Domain types, traits, and error definitions for the windowpack context
//! budget allocator. This crate has **no I/O dependencies**. It defines the
//! domain model that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the allocator consumes is a trait here:
//! - [`TokenCounter`] turns text into a token count
//! - [`KnowledgeSource`] answers `search(query, k)` with ranked snippets
//! - [`Summarizer`] shrinks text and is allowed to fail
//! - [`Provider`] is the generation call that consumes the assembled prompt
//!
//! Implementations live in their respective crates and are injected at
//! construction time.

pub mod error;
pub mod knowledge;
pub mod media;
pub mod message;
pub mod provider;
pub mod segment;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use error::{Error, KnowledgeError, ProviderError, Result, TokenizeError};
pub use knowledge::{Embedder, KnowledgeEntry, KnowledgeSource};
pub use media::{MediaMarker, MarkerScanner};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Summarizer, Usage};
pub use segment::{Segment, SegmentKind};
pub use token::{HeuristicCounter, TokenCounter, estimate_tokens};
