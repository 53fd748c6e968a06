use std::sync::Arc;

use docchat_model::{ModelProvider, Role};

use super::{ChatSession, RetrievalMode};
use crate::conversation::Conversation;
use crate::index::DocumentIndex;
use crate::model_client::ModelClient;
use crate::summary::SummaryStore;

/// [`ChatSession`] builder.
pub struct ChatSessionBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) system_prompt: Option<String>,
    pub(crate) temperature: Option<f32>,
    pub(crate) index: Option<Arc<DocumentIndex>>,
    pub(crate) retrieval_mode: RetrievalMode,
    pub(crate) summary_store: Option<Arc<dyn SummaryStore>>,
    pub(crate) on_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl ChatSessionBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder around an existing client.
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            system_prompt: None,
            temperature: None,
            index: None,
            retrieval_mode: RetrievalMode::default(),
            summary_store: None,
            on_delta: None,
        }
    }

    /// Sets the instructions the conversation starts with.
    #[inline]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the sampling temperature of conversation turns.
    #[inline]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Attaches the document index consulted before each turn.
    #[inline]
    pub fn with_index(mut self, index: Arc<DocumentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets when the index is consulted.
    #[inline]
    pub fn retrieval_mode(mut self, mode: RetrievalMode) -> Self {
        self.retrieval_mode = mode;
        self
    }

    /// Attaches the store summaries are persisted to.
    #[inline]
    pub fn with_summary_store(mut self, store: Arc<dyn SummaryStore>) -> Self {
        self.summary_store = Some(store);
        self
    }

    /// Attaches a callback invoked with every piece of the reply as it
    /// streams in.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_delta = Some(Arc::new(on_delta));
        self
    }

    /// Builds the session.
    pub fn build(self) -> ChatSession {
        let ChatSessionBuilder {
            model_client,
            system_prompt,
            temperature,
            index,
            retrieval_mode,
            summary_store,
            on_delta,
        } = self;

        let mut conversation = Conversation::default();
        if let Some(prompt) = &system_prompt {
            conversation.push_text(Role::System, prompt);
        }
        ChatSession {
            model_client,
            conversation,
            temperature,
            index,
            retrieval_mode,
            summary_store,
            on_delta,
        }
    }
}
