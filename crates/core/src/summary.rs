//! Conversation summaries and where they are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::prompts;

/// A condensed record of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConversationSummary {
    /// A short title for the conversation.
    pub title: String,
    /// What was discussed.
    pub summary: String,
}

impl ConversationSummary {
    /// Parses the model's JSON reply.
    ///
    /// Markdown code fences around the object are tolerated, since some
    /// models add them even in JSON mode.
    pub fn from_model_reply(reply: &str) -> Result<Self> {
        let json = strip_code_fence(reply.trim());
        let summary: ConversationSummary = serde_json::from_str(json)
            .map_err(|err| Error::InvalidSummary(err.to_string()))?;
        if summary.title.trim().is_empty() {
            return Err(Error::InvalidSummary("`title` is empty".to_owned()));
        }
        Ok(summary)
    }

    /// Returns the instruction that asks the model for a summary.
    pub fn instruction() -> String {
        let schema = schema_for!(ConversationSummary).to_value();
        prompts::render(
            prompts::CONVERSATION_SUMMARY,
            &[("schema", &schema.to_string())],
        )
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string, e.g. "json".
    let body = body.split_once('\n').map_or("", |(_, rest)| rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// A summary as it was persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSummary {
    /// The identifier assigned by the store.
    pub id: Uuid,
    /// A short title for the conversation.
    pub title: String,
    /// What was discussed.
    pub summary: String,
    /// When the summary was saved.
    pub created_at: DateTime<Utc>,
}

/// Persistence for conversation summaries.
///
/// Stores are append-only. A saved summary is never modified.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Inserts one summary.
    async fn save(&self, summary: &ConversationSummary) -> Result<SavedSummary>;
}
