//! Streaming transport helpers.

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::Sse;
