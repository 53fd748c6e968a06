//! Documents that can be indexed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A document loaded from the external collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Identifier unique within the collection.
    pub id: String,
    /// The `title` field, empty if the collection has none.
    pub title: String,
    /// The `summary` field, empty if the collection has none.
    pub summary: String,
    /// All selected fields, in collection order.
    pub fields: Map<String, Value>,
}

impl DocumentRecord {
    /// Returns the text that represents this document for indexing.
    ///
    /// Each selected field becomes a `name: value` line. Documents built
    /// without raw fields fall back to their title and summary.
    pub fn text(&self) -> String {
        if self.fields.is_empty() {
            return [self.title.as_str(), self.summary.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        let mut text = String::new();
        for (name, value) in &self.fields {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(name);
            text.push_str(": ");
            match value {
                Value::String(s) => text.push_str(s),
                Value::Null => {}
                other => text.push_str(&other.to_string()),
            }
        }
        text
    }
}

/// A collection that documents are loaded from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Returns a snapshot of the collection.
    async fn load(&self) -> Result<Vec<DocumentRecord>>;
}
