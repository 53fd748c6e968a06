use docchat_model::{ErrorKind, ModelProviderError};

/// Errors returned by the conversation and retrieval logic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model answered without any content.
    #[error("the model returned an empty completion")]
    EmptyCompletion,
    /// The model or embedding provider failed.
    #[error("model error ({kind}): {0}", kind = .0.kind())]
    Model(Box<dyn ModelProviderError>),
    /// The model's summary reply could not be understood.
    #[error("invalid summary: {0}")]
    InvalidSummary(String),
    /// The vector store is unusable for this request.
    #[error("index error: {0}")]
    Index(String),
    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// A file operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A value could not be encoded or decoded as JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the provider error kind if this is a model error.
    #[inline]
    pub fn model_error_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Model(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl From<Box<dyn ModelProviderError>> for Error {
    #[inline]
    fn from(err: Box<dyn ModelProviderError>) -> Self {
        Error::Model(err)
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
