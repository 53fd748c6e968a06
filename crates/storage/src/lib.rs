//! SQLite persistence for the document chat assistant: the saved
//! conversation summaries and the document collection.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod db;
mod document_source;
mod error;
mod ident;
mod summary_store;

pub use db::Database;
pub use document_source::SqliteDocumentSource;
pub use error::{Error, Result};
pub use summary_store::SqliteSummaryStore;
