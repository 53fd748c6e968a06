/// Errors returned by the SQLite stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A table or column name is not a plain identifier.
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    /// A document source was configured without any field.
    #[error("no document fields selected")]
    NoFields,
    /// A stored row could not be decoded.
    #[error("invalid row: {0}")]
    InvalidRow(String),
    /// The connection mutex was poisoned by a panicking thread.
    #[error("database lock poisoned")]
    LockPoisoned,
    /// A blocking database task failed to complete.
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// The database directory could not be created.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<Error> for docchat_core::Error {
    fn from(err: Error) -> Self {
        docchat_core::Error::Storage(err.to_string())
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
