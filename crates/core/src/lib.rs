//! Core logic of the document chat assistant: the conversation loop,
//! retrieval over the document index, and conversation summaries.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod chat;
pub mod conversation;
mod document;
mod error;
mod index;
mod model_client;
pub mod prompts;
mod retry;
mod summary;

pub use chat::{ChatSession, ChatSessionBuilder, RetrievalMode};
pub use document::{DocumentRecord, DocumentSource};
pub use error::{Error, Result};
pub use index::{
    DocumentIndex, IndexConfig, IndexedDocument, QueryResponse,
    RetrieverMode, SearchHit, SourceRef, VectorStore,
};
pub use model_client::{EmbeddingClient, ModelClient, ModelClientResponse};
pub use retry::RetryPolicy;
pub use summary::{ConversationSummary, SavedSummary, SummaryStore};
