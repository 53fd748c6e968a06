use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use docchat_model::{
    EmbeddingProvider, ErrorKind, ModelFinishReason, ModelMessage,
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeError(ErrorKind);

impl Display for FakeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeError {}

impl ModelProviderError for FakeError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct EchoResponse {
    words: VecDeque<String>,
    completed: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoResponse {
    fn new(input: &str) -> Self {
        let words = format!("You said {}", input)
            .split(" ")
            .map(ToString::to_string)
            .collect();
        Self {
            words,
            completed: false,
            sleep: None,
        }
    }
}

impl ModelResponse for EchoResponse {
    type Error = FakeError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(mut word) = this.words.pop_front() {
                if !this.words.is_empty() {
                    word.push(' ');
                }
                return Poll::Ready(Ok(Some(
                    ModelResponseEvent::MessageDelta(word),
                )));
            }
            if !this.completed {
                this.completed = true;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            }
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_event(cx)
    }
}

/// Echoes the last user message back.
struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = FakeError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.as_str()),
            _ => None,
        });
        let result = match last_user {
            Some(text) => Ok(EchoResponse::new(text)),
            None => Err(FakeError(ErrorKind::Other)),
        };
        ready(result)
    }
}

/// Embeds a text as its length and its count of spaces.
struct LengthEmbedder;

impl EmbeddingProvider for LengthEmbedder {
    type Error = FakeError;

    fn model_name(&self) -> &str {
        "length"
    }

    fn embed(
        &self,
        inputs: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, Self::Error>> + Send + 'static
    {
        let vectors = inputs
            .iter()
            .map(|s| vec![s.len() as f32, s.matches(' ').count() as f32])
            .collect();
        ready(Ok(vectors))
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    #[tokio::test]
    async fn test_completion() {
        let provider = EchoProvider;
        let req = ModelRequest::with_messages([
            ModelMessage::System("Be nice".to_string()),
            ModelMessage::User("Good morning".to_string()),
        ]);
        let mut resp = provider.send_request(&req).await.unwrap();

        let mut resp_message = String::new();
        let mut finish_reason = None;
        loop {
            let resp_fut =
                poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx));
            match resp_fut.await {
                Ok(Some(event)) => match event {
                    ModelResponseEvent::MessageDelta(delta) => {
                        resp_message.push_str(&delta);
                    }
                    ModelResponseEvent::Completed(reason) => {
                        finish_reason = Some(reason);
                    }
                    _ => unreachable!("unexpected event: {event:?}"),
                },
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(resp_message, "You said Good morning");
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_error() {
        let provider = EchoProvider;
        let req = ModelRequest::default();
        let result = provider.send_request(&req).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(!err.kind().is_transient());
    }

    #[tokio::test]
    async fn test_embedding_order() {
        let embedder = LengthEmbedder;
        let inputs = vec!["a b c".to_owned(), "abc".to_owned()];
        let vectors = embedder.embed(&inputs).await.unwrap();
        assert_eq!(vectors, vec![vec![5.0, 2.0], vec![3.0, 0.0]]);
    }
}
