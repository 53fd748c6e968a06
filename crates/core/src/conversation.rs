//! Conversation-related types.

use docchat_model::{ModelMessage, Role};

/// Represents a conversation, the ordered message history of a session.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    pub(crate) items: Vec<Item>,
}

impl Conversation {
    /// Returns the number of messages, system instructions included.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the conversation holds no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the items in chronological order.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[inline]
    pub(crate) fn push(&mut self, msg: ModelMessage, transcript: String) {
        self.items.push(Item { msg, transcript });
    }

    #[inline]
    pub(crate) fn push_text(&mut self, role: Role, text: &str) {
        self.push(ModelMessage::new(role, text), text.to_owned());
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Item> {
        self.items.pop()
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    /// Returns the messages to be sent to the model.
    pub(crate) fn model_messages(&self) -> Vec<ModelMessage> {
        self.items.iter().map(|i| i.msg.clone()).collect()
    }
}

/// An item in the conversation.
#[derive(Clone, Debug)]
pub struct Item {
    pub(crate) msg: ModelMessage,
    pub(crate) transcript: String,
}

impl Item {
    /// Returns the author of this item.
    #[inline]
    pub fn role(&self) -> Role {
        self.msg.role()
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is what the author actually wrote. For user items it
    /// may differ from the content sent to the model, which can carry
    /// retrieved document context as well.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Returns the content the model sees for this item.
    #[inline]
    pub fn model_content(&self) -> &str {
        self.msg.content()
    }
}
