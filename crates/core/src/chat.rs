//! The conversation loop: history, retrieval and summaries.

mod builder;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use docchat_model::{ModelMessage, ModelRequest, ResponseFormat, Role};
use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::index::{DocumentIndex, QueryResponse};
use crate::model_client::ModelClient;
use crate::prompts;
use crate::summary::{ConversationSummary, SavedSummary, SummaryStore};
pub use builder::ChatSessionBuilder;

/// When the document index is consulted for a user message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Never.
    Off,
    /// For every message.
    Always,
    /// When the model decides the message needs it.
    #[default]
    Auto,
}

impl RetrievalMode {
    /// Parses `off`, `always` or `auto`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "always" => Some(Self::Always),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// A chat session with a single user.
///
/// The session owns the message history. Every user turn may be augmented
/// with context from the attached [`DocumentIndex`], while the history
/// keeps what the user actually typed.
pub struct ChatSession {
    model_client: ModelClient,
    conversation: Conversation,
    temperature: Option<f32>,
    index: Option<Arc<DocumentIndex>>,
    retrieval_mode: RetrievalMode,
    summary_store: Option<Arc<dyn SummaryStore>>,
    on_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl ChatSession {
    /// Sends a user message and returns the assistant's reply.
    ///
    /// Both turns are appended to the history on success. On failure the
    /// history is left as it was.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let content = self.augment(text).await;
        self.conversation
            .push(ModelMessage::User(content), text.to_owned());

        let req = ModelRequest {
            messages: self.conversation.model_messages(),
            temperature: self.temperature,
            ..Default::default()
        };
        let on_delta = self.on_delta.clone();
        let reply = self
            .model_client
            .complete(req, move |delta| {
                if let Some(on_delta) = &on_delta {
                    on_delta(delta);
                }
            })
            .await;

        match reply {
            Ok(reply) => {
                self.conversation.push_text(Role::Assistant, &reply);
                Ok(reply)
            }
            Err(err) => {
                // Keep the history alternating.
                self.conversation.pop();
                Err(err)
            }
        }
    }

    /// Returns the content sent to the model for `text`.
    async fn augment(&self, text: &str) -> String {
        let Some(index) = &self.index else {
            return text.to_owned();
        };
        if index.is_empty() {
            trace!("index is empty, skipping lookup");
            return text.to_owned();
        }
        let needs_lookup = match self.retrieval_mode {
            RetrievalMode::Off => false,
            RetrievalMode::Always => true,
            RetrievalMode::Auto => match self.needs_lookup(text).await {
                Ok(needs_lookup) => needs_lookup,
                Err(err) => {
                    warn!("failed to route message: {err}");
                    false
                }
            },
        };
        if !needs_lookup {
            return text.to_owned();
        }

        match index.query(text).await {
            Ok(QueryResponse::Answer { text: context, sources }) => {
                debug!("augmenting message with {} sources", sources.len());
                prompts::render(
                    prompts::AUGMENTED_USER_MESSAGE,
                    &[("context_str", &context), ("query_str", text)],
                )
            }
            Ok(QueryResponse::NoInformation) => text.to_owned(),
            Err(err) => {
                warn!("document lookup failed: {err}");
                text.to_owned()
            }
        }
    }

    /// Asks the model whether `text` needs a document lookup.
    async fn needs_lookup(&self, text: &str) -> Result<bool> {
        let req = ModelRequest {
            messages: vec![
                ModelMessage::System(prompts::RETRIEVAL_ROUTER.to_owned()),
                ModelMessage::User(text.to_owned()),
            ],
            temperature: Some(0.0),
            ..Default::default()
        };
        let reply = self.model_client.complete(req, |_| {}).await?;
        let decision = reply.trim().to_ascii_lowercase().starts_with("yes");
        trace!("router replied {reply:?}, lookup: {decision}");
        Ok(decision)
    }

    /// Clears the whole history, system instructions included.
    #[inline]
    pub fn reset(&mut self) {
        self.conversation.clear();
    }

    /// Asks the model to summarize the conversation.
    ///
    /// Neither the instruction nor the reply is kept in the history.
    pub async fn summarize(&self) -> Result<ConversationSummary> {
        let mut messages = self.conversation.model_messages();
        messages.push(ModelMessage::User(ConversationSummary::instruction()));
        let req = ModelRequest {
            messages,
            response_format: ResponseFormat::JsonObject,
            temperature: self.temperature,
        };
        let reply = self.model_client.complete(req, |_| {}).await?;
        ConversationSummary::from_model_reply(&reply)
    }

    /// Saves `summary` to the attached store.
    pub async fn persist(
        &self,
        summary: &ConversationSummary,
    ) -> Result<SavedSummary> {
        let Some(store) = &self.summary_store else {
            return Err(Error::Storage("no summary store attached".to_owned()));
        };
        let saved = store.save(summary).await?;
        info!("saved summary {}", saved.id);
        Ok(saved)
    }

    /// Summarizes the conversation and saves the summary.
    pub async fn summarize_and_persist(&self) -> Result<SavedSummary> {
        let summary = self.summarize().await?;
        self.persist(&summary).await
    }

    /// Returns `(role, transcript)` pairs in chronological order.
    pub fn history(&self) -> Vec<(Role, &str)> {
        self.conversation
            .items()
            .iter()
            .map(|item| (item.role(), item.transcript()))
            .collect()
    }

    /// Returns the underlying conversation.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the number of stored messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.conversation.len()
    }

    /// Returns `true` if no messages are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conversation.is_empty()
    }
}
