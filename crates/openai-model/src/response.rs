use std::pin::Pin;
use std::task::{Context, Poll, ready};

use docchat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    TokenUsage,
};
use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, parse_finish_reason};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Both fields are taken once the corresponding event has been emitted.
    pending_finish_reason: Option<ModelFinishReason>,
    pending_usage: Option<TokenUsage>,
}

type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<BoxFuture<'static, NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            pending_finish_reason: None,
            pending_usage: None,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    let sse = &mut partial_state.sse;
    let mut message_delta = None;

    loop {
        let sse_event = match sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if !chunk.id.is_empty()
            && partial_state.id.get_or_insert_with(|| chunk.id.clone())
                != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        if let Some(usage) = chunk.usage {
            partial_state.pending_usage = Some(usage.into());
        }

        let Some(choice) = chunk.choices.pop() else {
            // Usage-only chunks carry no choices, keep reading.
            continue;
        };

        // A chunk may carry both the last piece of content and the finish
        // reason, so the content is taken first.
        message_delta = choice.delta.content.filter(|c| !c.is_empty());
        if let Some(finish_reason) = choice.finish_reason {
            partial_state.pending_finish_reason =
                Some(parse_finish_reason(&finish_reason));
        }

        if message_delta.is_some() {
            break;
        }
    }

    // The order of events are important. Always emit message delta first,
    // then the finish reason, and finally the usage if any.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    if let Some(usage) = partial_state.pending_usage.take() {
        return Ok((Some(ModelResponseEvent::Usage(usage)), partial_state));
    }

    Ok((None, partial_state))
}
