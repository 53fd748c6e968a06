//! Environment-driven configuration.

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use docchat_core::{RetrievalMode, RetrieverMode};
use serde::Deserialize;

/// Errors found while reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable is set to something unusable.
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        /// Name of the variable.
        name: &'static str,
        /// The value found.
        value: String,
        /// What is expected instead.
        reason: &'static str,
    },
    /// The instructions file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadInstructions {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The instructions file is not `{"instructions": "..."}`.
    #[error("failed to parse {}: {source}", path.display())]
    ParseInstructions {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// Everything the assistant needs to start.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Key for the chat and embedding endpoints.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Chat model.
    pub model_name: String,
    /// Embedding model.
    pub embedding_model: String,
    /// Sampling temperature of the requests made by the index.
    pub temperature: f32,
    /// SQLite file holding the documents and the saved summaries.
    pub database_path: PathBuf,
    /// Table holding the document collection.
    pub collection_name: String,
    /// Columns of the collection that make up a document.
    pub document_fields: Vec<String>,
    /// Table the conversation summaries are saved to.
    pub summary_table: String,
    /// Directory of the vector store.
    pub index_dir: PathBuf,
    /// JSON file with the system instructions.
    pub instructions_path: PathBuf,
    /// Whether the instructions file was configured explicitly.
    pub instructions_required: bool,
    /// When the index is consulted.
    pub retrieval_mode: RetrievalMode,
    /// How the index finds candidate documents.
    pub retriever: RetrieverMode,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value
    /// of a variable if it is set.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| {
            var(name).unwrap_or_else(|| default.to_owned())
        };

        let api_key = var("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;

        let temperature = or("TEMPERATURE", "0.1");
        let temperature = match temperature.trim().parse::<f32>() {
            Ok(t) if (0.0..=2.0).contains(&t) => t,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "TEMPERATURE",
                    value: temperature,
                    reason: "expected a number between 0 and 2",
                });
            }
        };

        let document_fields: Vec<String> =
            or("DOCUMENT_FIELDS", "title,summary")
                .split(',')
                .map(|f| f.trim().to_owned())
                .filter(|f| !f.is_empty())
                .collect();
        if document_fields.is_empty() {
            return Err(ConfigError::Invalid {
                name: "DOCUMENT_FIELDS",
                value: String::new(),
                reason: "expected comma-separated field names",
            });
        }

        let retrieval_mode = or("RETRIEVAL_MODE", "auto");
        let Some(retrieval_mode) = RetrievalMode::from_name(&retrieval_mode)
        else {
            return Err(ConfigError::Invalid {
                name: "RETRIEVAL_MODE",
                value: retrieval_mode,
                reason: "expected `off`, `always` or `auto`",
            });
        };

        let retriever = or("RETRIEVER_MODE", "embedding");
        let retriever = match retriever.trim().to_ascii_lowercase().as_str() {
            "embedding" => RetrieverMode::Embedding,
            "llm" => RetrieverMode::Llm,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "RETRIEVER_MODE",
                    value: retriever,
                    reason: "expected `embedding` or `llm`",
                });
            }
        };

        let instructions_path = var("INSTRUCTIONS_PATH");
        Ok(Self {
            api_key,
            base_url: or("BASE_URL", "https://api.openai.com/v1"),
            model_name: or("MODEL_NAME", "gpt-4"),
            embedding_model: or("EMBEDDING_MODEL", "text-embedding-3-small"),
            temperature,
            database_path: or("DATABASE_PATH", "./docchat.db").into(),
            collection_name: or("COLLECTION_NAME", "documents"),
            document_fields,
            summary_table: or("SUMMARY_TABLE", "conversations"),
            index_dir: or("INDEX_DIR", "./vector_index").into(),
            instructions_required: instructions_path.is_some(),
            instructions_path: instructions_path
                .unwrap_or_else(|| ".instructions.json".to_owned())
                .into(),
            retrieval_mode,
            retriever,
        })
    }

    /// Reads the system instructions.
    ///
    /// A missing file is only an error if its path was set explicitly.
    pub fn load_instructions(&self) -> Result<Option<String>, ConfigError> {
        match read_instructions(&self.instructions_path) {
            Err(ConfigError::ReadInstructions { source, .. })
                if source.kind() == io::ErrorKind::NotFound
                    && !self.instructions_required =>
            {
                warn!(
                    "{} not found, starting without instructions",
                    self.instructions_path.display()
                );
                Ok(None)
            }
            other => other.map(Some),
        }
    }
}

#[derive(Deserialize)]
struct InstructionsFile {
    instructions: String,
}

fn read_instructions(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| {
        ConfigError::ReadInstructions {
            path: path.to_owned(),
            source,
        }
    })?;
    let file: InstructionsFile =
        serde_json::from_str(&content).map_err(|source| {
            ConfigError::ParseInstructions {
                path: path.to_owned(),
                source,
            }
        })?;
    Ok(file.instructions)
}
