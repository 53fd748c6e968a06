//! A terminal assistant that answers from a document collection.
//!
//! The crate includes a CLI tool for using in the terminal. The pieces it
//! is assembled from are exposed for other hosts as well.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod command;
mod config;
mod session;

pub use config::{Config, ConfigError};
pub use session::{Session, SessionBuilder};

/// Re-exports of [`docchat_core`] crate.
pub mod core {
    pub use docchat_core::*;
}
