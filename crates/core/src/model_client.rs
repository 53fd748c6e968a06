use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use docchat_model::{
    Embedding, EmbeddingProvider, ModelFinishReason, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    TokenUsage,
};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, retry_transient};

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Box<dyn Fn(&str) + Send + 'static>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Creates a client with the default [`RetryPolicy`].
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        Self::with_retry_policy(provider, RetryPolicy::default())
    }

    /// Creates a client that retries transient failures with `policy`.
    pub fn with_retry_policy<P: ModelProvider + 'static>(
        provider: P,
        policy: RetryPolicy,
    ) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let provider = Arc::clone(&provider);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = retry_transient(&policy, || {
                        provider.send_request(&req)
                    })
                    .await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the response.
    ///
    /// `on_delta` is invoked with every piece of text as it streams in.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }

    /// Sends a request and returns the full text of the reply.
    ///
    /// A reply without any visible text is reported as
    /// [`Error::EmptyCompletion`].
    pub async fn complete(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> Result<String> {
        let resp = self.send_request(req, on_delta).await?;
        if resp.transcript.trim().is_empty() {
            warn!(finish_reason = ?resp.finish_reason, "empty completion");
            return Err(Error::EmptyCompletion);
        }
        Ok(resp.transcript)
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    /// The concatenated text deltas.
    pub transcript: String,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
    /// Token accounting, if the provider reported it.
    pub usage: Option<TokenUsage>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: Box<dyn Fn(&str) + Send + 'static>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let mut finish_reason = None;
    let mut usage = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                on_delta(&msg);
                transcript.push_str(&msg);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
            ModelResponseEvent::Usage(u) => {
                usage = Some(u);
            }
        }
    }

    if let Some(usage) = usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "finished a request"
        );
    } else {
        trace!("finished a request");
    }

    Ok(ModelClientResponse {
        transcript,
        finish_reason,
        usage,
    })
}

type EmbedResult = Result<Vec<Embedding>, Box<dyn ModelProviderError>>;
type EmbedFn = Arc<
    dyn Fn(Vec<String>) -> Pin<Box<dyn Future<Output = EmbedResult> + Send>>
        + Send
        + Sync,
>;

/// The embedding counterpart of [`ModelClient`].
#[derive(Clone)]
pub struct EmbeddingClient {
    model_name: Arc<str>,
    embed_fn: EmbedFn,
}

impl EmbeddingClient {
    /// Creates a client with the default [`RetryPolicy`].
    #[inline]
    pub fn new<P: EmbeddingProvider + 'static>(provider: P) -> Self {
        Self::with_retry_policy(provider, RetryPolicy::default())
    }

    /// Creates a client that retries transient failures with `policy`.
    pub fn with_retry_policy<P: EmbeddingProvider + 'static>(
        provider: P,
        policy: RetryPolicy,
    ) -> Self {
        let model_name = Arc::from(provider.model_name());
        let provider = Arc::new(provider);
        let embed_fn: EmbedFn = Arc::new(move |inputs| {
            let provider = Arc::clone(&provider);
            Box::pin(
                async move {
                    let count = inputs.len();
                    let embeddings =
                        retry_transient(&policy, || provider.embed(&inputs))
                            .await
                            .map_err(|err| {
                                error!("got an error: {err:?}");
                                Box::new(err) as Box<dyn ModelProviderError>
                            })?;
                    trace!("embedded {count} inputs");
                    Ok(embeddings)
                }
                .instrument(trace_span!("embedding client req")),
            )
        });
        Self {
            model_name,
            embed_fn,
        }
    }

    /// Returns the name of the underlying embedding model.
    #[inline]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embeds the inputs, one vector per input.
    pub async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Embedding>> {
        let expected = inputs.len();
        let embeddings = (self.embed_fn)(inputs).await?;
        if embeddings.len() != expected {
            return Err(Error::Index(format!(
                "expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use docchat_model::{ErrorKind, ModelMessage};
    use docchat_test_model::{
        PresetEvent, PresetResponse, TestEmbeddingProvider, TestModelProvider,
    };

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            max_elapsed_time: Duration::from_secs(5),
        }
    }

    fn hi_request() -> ModelRequest {
        ModelRequest::with_messages([ModelMessage::User("Hi".to_owned())])
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        for _ in 0..3 {
            model_provider.add_response(PresetResponse::with_events([
                PresetEvent::MessageDelta("How ".to_owned()),
                PresetEvent::MessageDelta("are ".to_owned()),
                PresetEvent::MessageDelta("you?".to_owned()),
            ]));
        }

        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let on_delta_called = Arc::new(AtomicBool::new(false));
            let resp = model_client
                .send_request(hi_request(), {
                    let on_delta_called = Arc::clone(&on_delta_called);
                    move |_| {
                        on_delta_called.store(true, Ordering::Relaxed);
                    }
                })
                .await
                .unwrap();
            assert_eq!(resp.transcript, "How are you?");
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
            assert!(on_delta_called.load(Ordering::Relaxed));
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let resp_or_err = model_client.send_request(hi_request(), |_| {}).await;
        assert_eq!(resp_or_err.unwrap_err().kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_empty_completion() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([]));
        model_provider.add_text_response("   ");
        let model_client = ModelClient::new(model_provider);

        for _ in 0..2 {
            let err = model_client.complete(hi_request(), |_| {}).await;
            assert!(matches!(err, Err(Error::EmptyCompletion)));
        }
    }

    #[tokio::test]
    async fn test_retry_rate_limited() {
        let mut model_provider = TestModelProvider::default();
        let preset = PresetResponse::with_text("Finally").with_failures(2);
        model_provider.add_response(preset);
        let inspector = model_provider.clone();

        let model_client =
            ModelClient::with_retry_policy(model_provider, fast_retry());
        let reply = model_client.complete(hi_request(), |_| {}).await.unwrap();
        assert_eq!(reply, "Finally");
        assert_eq!(inspector.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_permanent_error() {
        let model_provider = TestModelProvider::default();
        let inspector = model_provider.clone();

        let model_client =
            ModelClient::with_retry_policy(model_provider, fast_retry());
        let err = model_client
            .complete(hi_request(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.model_error_kind(), Some(ErrorKind::Other));
        assert!(err.to_string().starts_with("model error (Other): "));
        assert_eq!(inspector.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_response(PresetResponse::with_text("Never").with_failures(0));

        let policy = RetryPolicy::never();
        let model_client =
            ModelClient::with_retry_policy(model_provider, policy);
        let err = model_client.complete(hi_request(), |_| {}).await;
        assert_eq!(
            err.unwrap_err().model_error_kind(),
            Some(ErrorKind::RateLimitExceeded)
        );
    }

    #[tokio::test]
    async fn test_embedding_client() {
        let client = EmbeddingClient::new(TestEmbeddingProvider::new(16));
        assert_eq!(client.model_name(), "test-bow-16");
        let vectors = client
            .embed(vec!["one".to_owned(), "two".to_owned()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 16);
    }
}
