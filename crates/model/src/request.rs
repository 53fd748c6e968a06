/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelRequest {
    /// The input messages, in chronological order.
    pub messages: Vec<ModelMessage>,
    /// The format the model must produce.
    pub response_format: ResponseFormat,
    /// Sampling temperature. `None` leaves it to the provider's default.
    pub temperature: Option<f32>,
}

impl ModelRequest {
    /// Creates a plain-text request with the given messages.
    #[inline]
    pub fn with_messages(messages: impl Into<Vec<ModelMessage>>) -> Self {
        Self {
            messages: messages.into(),
            ..Default::default()
        }
    }
}

/// The role of a message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The system instructions.
    System,
    /// The human on the other side.
    User,
    /// The model.
    Assistant,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

impl ModelMessage {
    /// Creates a message with the given role.
    #[inline]
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        match role {
            Role::System => ModelMessage::System(content.into()),
            Role::User => ModelMessage::User(content.into()),
            Role::Assistant => ModelMessage::Assistant(content.into()),
        }
    }

    /// Returns the role of this message.
    #[inline]
    pub fn role(&self) -> Role {
        match self {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant(_) => Role::Assistant,
        }
    }

    /// Returns the text content of this message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            ModelMessage::System(content)
            | ModelMessage::User(content)
            | ModelMessage::Assistant(content) => content,
        }
    }
}

/// The output format requested from the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseFormat {
    /// Free-form text.
    #[default]
    Text,
    /// A single valid JSON object.
    ///
    /// Most providers also require the word "JSON" to appear somewhere in
    /// the messages when this mode is used.
    JsonObject,
}
