//! Local fake models for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use docchat_model::{
    Embedding, EmbeddingProvider, ErrorKind, ModelFinishReason,
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// Pause between two streamed events.
const EVENT_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        let Some(pending) = &mut this.sleep else {
            this.sleep = Some(Box::pin(sleep(EVENT_DELAY)));
            return Pin::new(this).poll_next_event(cx);
        };
        ready!(pending.as_mut().poll(cx));
        this.sleep = None;

        let event_idx = this.event_idx;
        this.event_idx += 1;
        if let Some(event) = this.events.get(event_idx) {
            let event = match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
            };
            Poll::Ready(Ok(Some(event)))
        } else if event_idx == this.events.len() {
            Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                ModelFinishReason::Stop,
            ))))
        } else {
            // In case this method is called after completion.
            Poll::Ready(Ok(None))
        }
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    // Failed attempts spent on the front response.
    attempts: u64,
    requests: Vec<ModelRequest>,
}

/// A local fake chat model for testing purpose.
///
/// Before sending requests, you need to queue the responses. Each request
/// consumes the front of the queue, regardless of its content. If the queue
/// is empty, an error will be returned. Every request is recorded and can
/// be inspected with [`TestModelProvider::requests`].
///
/// Clones share the same queue, so a test can keep a clone for inspection
/// after handing the provider to the code under test.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
}

impl TestModelProvider {
    /// Queues a response.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().responses.push_back(preset);
    }

    /// Queues a response that streams `text` word by word.
    #[inline]
    pub fn add_text_response(&mut self, text: &str) {
        self.add_response(PresetResponse::with_text(text));
    }

    /// Returns all requests received so far, including failed ones.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of queued responses not consumed yet.
    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A poisoned lock only happens when another test thread panicked.
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<Vec<PresetEvent>, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(failures) = script.responses.front().map(|p| p.failures)
        else {
            return Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            });
        };
        match failures {
            Some(0) => {
                return Err(Error {
                    message: "always failing",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            Some(failures) if script.attempts < failures => {
                script.attempts += 1;
                return Err(Error {
                    message: "failing on purpose",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            _ => {}
        }

        script.attempts = 0;
        let preset = script.responses.pop_front().map(|p| p.events);
        Ok(preset.unwrap_or_default())
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let resp = self.next_response(req).map(|events| TestModelResponse {
            events,
            event_idx: 0,
            sleep: None,
        });
        ready(resp)
    }
}

/// A deterministic bag-of-words embedder for testing purpose.
///
/// Every lowercase alphanumeric word is hashed into one of the dimensions,
/// and the counts are L2-normalized. Texts sharing words are therefore
/// similar, and texts without common words are orthogonal (modulo hash
/// collisions).
#[derive(Clone, Debug)]
pub struct TestEmbeddingProvider {
    dimensions: usize,
    model_name: String,
    calls: Arc<Mutex<usize>>,
}

impl TestEmbeddingProvider {
    #[inline]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_name: format!("test-bow-{dimensions}"),
            calls: Default::default(),
        }
    }

    /// Returns how many times [`EmbeddingProvider::embed`] was called.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);
        for word in words {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for TestEmbeddingProvider {
    #[inline]
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingProvider for TestEmbeddingProvider {
    type Error = crate::Error;

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(
        &self,
        inputs: &[String],
    ) -> impl Future<Output = Result<Vec<Embedding>, Self::Error>> + Send + 'static
    {
        *self.calls.lock().unwrap_or_else(|err| err.into_inner()) += 1;
        let vectors = inputs.iter().map(|s| self.embed_text(s)).collect();
        ready(Ok(vectors))
    }
}
