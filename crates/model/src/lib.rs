//! An abstraction layer for chat and embedding models.
//!
//! This crate establishes an unified protocol for the assistant to talk to
//! the supported model providers, so that the conversation and retrieval
//! logic can switch between them (or a fake one in tests) without touching
//! the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod embedding;
mod error;
mod provider;
mod request;
mod response;

pub use embedding::*;
pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
