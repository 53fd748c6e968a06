use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failures` attempts with
    /// a rate limit error. `Some(0)` means the request will fail
    /// infinitely.
    pub failures: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// Creates a `PresetResponse` that streams `text` word by word.
    pub fn with_text(text: &str) -> Self {
        let mut events = vec![];
        let mut rest = text;
        while !rest.is_empty() {
            let first_len = rest.chars().next().map_or(0, char::len_utf8);
            let split_at = rest[first_len..]
                .find(' ')
                .map(|idx| idx + first_len)
                .unwrap_or(rest.len());
            let (word, tail) = rest.split_at(split_at);
            events.push(PresetEvent::MessageDelta(word.to_owned()));
            rest = tail;
        }
        Self::with_events(events)
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }
}
