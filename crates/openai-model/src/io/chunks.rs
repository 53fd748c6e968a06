#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The response body broke off before it was fully read.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

/// Where the bytes of a streamed body come from.
pub enum Chunks {
    Body(Response),
    #[cfg(test)]
    Scripted(VecDeque<Bytes>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Body(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(chunks: VecDeque<Bytes>) -> Self {
        Chunks::Scripted(chunks)
    }

    /// Returns the next chunk, or `None` once the body is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Body(response) => {
                response.chunk().await.map_err(|err| {
                    debug!("body read failed: {err}");
                    Error
                })
            }
            #[cfg(test)]
            Chunks::Scripted(chunks) => Ok(chunks.pop_front()),
        }
    }
}
