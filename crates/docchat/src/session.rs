use std::path::Path;
use std::sync::Arc;

use docchat_core::{
    ChatSession, ChatSessionBuilder, ConversationSummary, DocumentIndex,
    DocumentSource, EmbeddingClient, IndexConfig, ModelClient, Result,
    RetrievalMode, SavedSummary, SummaryStore,
};
use docchat_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use docchat_storage::{Database, SqliteDocumentSource, SqliteSummaryStore};

use crate::config::Config;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    config: Config,
    instructions: Option<String>,
}

impl SessionBuilder {
    /// Creates a session builder from the configuration.
    #[inline]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            instructions: None,
        }
    }

    /// Sets the system instructions of the conversation.
    #[inline]
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Connects the model provider, the database and the index.
    pub fn build(self) -> Result<Session> {
        let Self {
            config,
            instructions,
        } = self;

        let openai_config = OpenAIConfigBuilder::with_api_key(&config.api_key)
            .with_base_url(&config.base_url)
            .with_model(&config.model_name)
            .with_embedding_model(&config.embedding_model)
            .build();
        let provider = OpenAIProvider::new(openai_config);
        let model_client = ModelClient::new(provider.clone());
        let embedding_client =
            EmbeddingClient::new(provider.embedding_provider());

        let index = DocumentIndex::open(
            &config.index_dir,
            model_client.clone(),
            embedding_client,
            IndexConfig {
                retriever: config.retriever,
                temperature: Some(config.temperature),
                ..Default::default()
            },
        )?;

        let db = Arc::new(Database::open(&config.database_path)?);
        let summary_store =
            SqliteSummaryStore::new(Arc::clone(&db), &config.summary_table)?;
        let documents = SqliteDocumentSource::new(
            db,
            &config.collection_name,
            &config.document_fields,
        )?;

        Ok(Session::from_parts(
            model_client,
            instructions,
            Arc::new(index),
            Arc::new(summary_store),
            Arc::new(documents),
            config.retrieval_mode,
        ))
    }
}

/// A chat session as the terminal presents it.
///
/// It owns the conversation and knows where documents and summaries live.
pub struct Session {
    chat: ChatSession,
    index: Arc<DocumentIndex>,
    documents: Arc<dyn DocumentSource>,
}

impl Session {
    /// Assembles a session from already connected parts.
    pub fn from_parts(
        model_client: ModelClient,
        instructions: Option<String>,
        index: Arc<DocumentIndex>,
        summary_store: Arc<dyn SummaryStore>,
        documents: Arc<dyn DocumentSource>,
        retrieval_mode: RetrievalMode,
    ) -> Self {
        let mut builder = ChatSessionBuilder::with_model_client(model_client)
            .with_index(Arc::clone(&index))
            .with_summary_store(summary_store)
            .retrieval_mode(retrieval_mode);
        if let Some(instructions) = instructions {
            builder = builder.system_prompt(instructions);
        }
        Self {
            chat: builder.build(),
            index,
            documents,
        }
    }

    /// Sends a message and returns the reply.
    #[inline]
    pub async fn send_message(&mut self, message: &str) -> Result<String> {
        self.chat.send(message).await
    }

    /// Forgets the conversation.
    #[inline]
    pub fn clear(&mut self) {
        self.chat.reset();
    }

    /// Summarizes the conversation.
    #[inline]
    pub async fn summarize(&self) -> Result<ConversationSummary> {
        self.chat.summarize().await
    }

    /// Saves a summary.
    #[inline]
    pub async fn save(
        &self,
        summary: &ConversationSummary,
    ) -> Result<SavedSummary> {
        self.chat.persist(summary).await
    }

    /// Reloads the documents and rebuilds the index from them.
    ///
    /// Returns the number of documents indexed.
    pub async fn update_index(&self) -> Result<usize> {
        let documents = self.documents.load().await?;
        info!("loaded {} documents", documents.len());
        self.index.rebuild(&documents).await
    }

    /// Returns the number of messages in the conversation.
    #[inline]
    pub fn len(&self) -> usize {
        self.chat.len()
    }

    /// Returns `true` if the conversation is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chat.is_empty()
    }

    /// Returns the number of indexed documents.
    #[inline]
    pub fn indexed_documents(&self) -> usize {
        self.index.len()
    }

    /// Returns the directory the index is persisted in, if any.
    #[inline]
    pub fn index_dir(&self) -> Option<&Path> {
        self.index.dir()
    }
}
