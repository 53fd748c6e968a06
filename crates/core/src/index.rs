//! Document index: summaries of the document collection, searchable by
//! similarity, with answers synthesized by the model.

mod choice_select;
mod synthesize;
mod vector_store;

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use docchat_model::{ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::document::DocumentRecord;
use crate::error::{Error, Result};
use crate::model_client::{EmbeddingClient, ModelClient};
use crate::prompts;
pub use vector_store::{IndexedDocument, SearchHit, VectorStore};

/// How candidate documents are found for a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverMode {
    /// Cosine similarity between the query and summary embeddings.
    #[default]
    Embedding,
    /// The model picks documents from their numbered summaries.
    Llm,
}

/// Tuning knobs of a [`DocumentIndex`].
#[derive(Clone, Debug, PartialEq)]
pub struct IndexConfig {
    /// How candidates are found.
    pub retriever: RetrieverMode,
    /// Number of documents kept by the embedding retriever.
    pub similarity_top_k: usize,
    /// Hits scoring below this are dropped by the embedding retriever.
    pub min_score: f32,
    /// Number of documents kept by the model retriever.
    pub choice_top_k: usize,
    /// Number of summaries shown to the model per selection request.
    pub choice_batch_size: usize,
    /// Upper bound of the context handed to the model in one request.
    pub max_context_chars: usize,
    /// Maximum number of summaries embedded in one request.
    pub embedding_batch_size: usize,
    /// Sampling temperature for the requests made by the index.
    pub temperature: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            retriever: RetrieverMode::Embedding,
            similarity_top_k: 2,
            min_score: 0.2,
            choice_top_k: 2,
            choice_batch_size: 10,
            max_context_chars: 8_000,
            embedding_batch_size: 256,
            temperature: Some(0.1),
        }
    }
}

/// A document the answer was drawn from.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRef {
    /// Identifier of the source document.
    pub doc_id: String,
    /// Title of the source document.
    pub title: String,
    /// Similarity score, or the model's relevance score in
    /// [`RetrieverMode::Llm`].
    pub score: f32,
}

/// The outcome of [`DocumentIndex::query`].
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResponse {
    /// An answer synthesized from the matched documents.
    Answer {
        /// The synthesized text.
        text: String,
        /// The documents it was drawn from, best first.
        sources: Vec<SourceRef>,
    },
    /// The index holds nothing relevant to the query.
    NoInformation,
}

/// An index over model-derived summaries of the document collection.
///
/// The index is optionally backed by a directory, in which case every
/// [`DocumentIndex::rebuild`] is persisted there.
pub struct DocumentIndex {
    model: ModelClient,
    embedder: EmbeddingClient,
    config: IndexConfig,
    dir: Option<PathBuf>,
    store: RwLock<VectorStore>,
}

impl DocumentIndex {
    /// Opens the index persisted in `dir`, or an empty one if there is
    /// none yet.
    pub fn open(
        dir: impl Into<PathBuf>,
        model: ModelClient,
        embedder: EmbeddingClient,
        config: IndexConfig,
    ) -> Result<Self> {
        let dir = dir.into();
        let store = VectorStore::load(&dir)?;
        info!("opened index with {} documents", store.len());
        Ok(Self {
            model,
            embedder,
            config,
            dir: Some(dir),
            store: RwLock::new(store),
        })
    }

    /// Creates an empty index that lives only in memory.
    #[inline]
    pub fn in_memory(
        model: ModelClient,
        embedder: EmbeddingClient,
        config: IndexConfig,
    ) -> Self {
        Self {
            model,
            embedder,
            config,
            dir: None,
            store: Default::default(),
        }
    }

    /// Returns the backing directory, if any.
    #[inline]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Returns the number of indexed documents.
    pub fn len(&self) -> usize {
        self.read_store().map(|s| s.len()).unwrap_or(0)
    }

    /// Returns `true` if no documents are indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Answers `text` from the indexed documents.
    pub async fn query(&self, text: &str) -> Result<QueryResponse> {
        self.query_inner(text)
            .instrument(trace_span!("index query"))
            .await
    }

    async fn query_inner(&self, text: &str) -> Result<QueryResponse> {
        if self.is_empty() {
            debug!("index is empty");
            return Ok(QueryResponse::NoInformation);
        }

        let hits = match self.config.retriever {
            RetrieverMode::Embedding => {
                self.retrieve_by_embedding(text).await?
            }
            RetrieverMode::Llm => self.retrieve_by_choice(text).await?,
        };
        if hits.is_empty() {
            debug!("no documents matched");
            return Ok(QueryResponse::NoInformation);
        }

        let passages = hits.iter().map(|h| h.document.passage()).collect();
        let answer = synthesize::tree_summarize(
            &self.model,
            passages,
            text,
            self.config.max_context_chars,
            self.config.temperature,
        )
        .await?;
        if synthesize::is_no_information(&answer) {
            debug!("model found no information in {} hits", hits.len());
            return Ok(QueryResponse::NoInformation);
        }

        let sources = hits
            .into_iter()
            .map(|h| SourceRef {
                doc_id: h.document.doc_id,
                title: h.document.title,
                score: h.score,
            })
            .collect();
        Ok(QueryResponse::Answer {
            text: answer,
            sources,
        })
    }

    async fn retrieve_by_embedding(
        &self,
        text: &str,
    ) -> Result<Vec<SearchHit>> {
        let query = self
            .embedder
            .embed(vec![text.to_owned()])
            .await?
            .pop()
            .unwrap_or_default();

        let store = self.read_store()?;
        store.check_compatible(self.embedder.model_name(), query.len())?;
        let hits = store.search(
            &query,
            self.config.similarity_top_k,
            self.config.min_score,
        );
        trace!("embedding retriever found {} hits", hits.len());
        Ok(hits)
    }

    async fn retrieve_by_choice(
        &self,
        text: &str,
    ) -> Result<Vec<SearchHit>> {
        let documents = self.read_store()?.entries().to_vec();
        let choices = choice_select::select(
            &self.model,
            &documents,
            text,
            self.config.choice_batch_size,
            self.config.choice_top_k,
            self.config.temperature,
        )
        .await?;
        trace!("model retriever picked {} documents", choices.len());

        let hits = choices
            .into_iter()
            .map(|c| SearchHit {
                document: documents[c.position].clone(),
                score: c.relevance,
            })
            .collect();
        Ok(hits)
    }

    /// Replaces the index contents with `documents`.
    ///
    /// Each document is summarized by the model and the summary embedded.
    /// Documents without any text are skipped. Returns the number of
    /// documents indexed.
    pub async fn rebuild(&self, documents: &[DocumentRecord]) -> Result<usize> {
        self.rebuild_inner(documents)
            .instrument(trace_span!("index rebuild"))
            .await
    }

    async fn rebuild_inner(
        &self,
        documents: &[DocumentRecord],
    ) -> Result<usize> {
        let mut summarized = Vec::with_capacity(documents.len());
        for doc in documents {
            let text = doc.text();
            if text.trim().is_empty() {
                warn!("skipping document {} without text", doc.id);
                continue;
            }
            let summary = self.summarize_document(&text).await?;
            trace!("summarized document {}", doc.id);
            summarized.push((doc, summary));
        }

        let summaries: Vec<_> =
            summarized.iter().map(|(_, s)| s.clone()).collect();
        let batch_size = self.config.embedding_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(summaries.len());
        for batch in summaries.chunks(batch_size) {
            embeddings.extend(self.embedder.embed(batch.to_vec()).await?);
        }

        let entries: Vec<_> = summarized
            .into_iter()
            .zip(embeddings)
            .map(|((doc, summary), embedding)| IndexedDocument {
                doc_id: doc.id.clone(),
                title: doc.title.clone(),
                summary,
                embedding,
            })
            .collect();
        let count = entries.len();

        let mut store = VectorStore::default();
        store.replace(self.embedder.model_name(), entries)?;
        if let Some(dir) = &self.dir {
            store.persist(dir)?;
        }
        *self.write_store()? = store;

        info!("indexed {count} of {} documents", documents.len());
        Ok(count)
    }

    async fn summarize_document(&self, text: &str) -> Result<String> {
        let prompt = prompts::render(
            prompts::DOCUMENT_SUMMARY,
            &[("document", text), ("summary_query", prompts::SUMMARY_QUERY)],
        );
        let req = ModelRequest {
            messages: vec![
                ModelMessage::System(prompts::QA_SYSTEM.to_owned()),
                ModelMessage::User(prompt),
            ],
            temperature: self.config.temperature,
            ..Default::default()
        };
        let summary = self.model.complete(req, |_| {}).await?;
        Ok(summary.trim().to_owned())
    }

    fn read_store(&self) -> Result<RwLockReadGuard<'_, VectorStore>> {
        self.store
            .read()
            .map_err(|err| Error::Index(format!("lock poisoned: {err}")))
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, VectorStore>> {
        self.store
            .write()
            .map_err(|err| Error::Index(format!("lock poisoned: {err}")))
    }
}
