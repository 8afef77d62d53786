//! Typed conversation history owned by one agent instance.

use serde::{Deserialize, Serialize};

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message: text plus at most one embedded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub image_base64: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            image_base64: None,
        }
    }

    pub fn user(text: impl Into<String>, image_base64: Option<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image_base64,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image_base64: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_base64.is_some()
    }

    /// Strip the embedded image to save context space.
    pub fn drop_image(&mut self) {
        self.image_base64 = None;
    }
}

/// Ordered message sequence with exactly one system message at index 0
/// once initialized.
///
/// The push API maintains the invariant: `push_system` on a non-empty
/// history replaces the existing system prompt instead of appending a
/// second one.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the system prompt at index 0, replacing any existing one.
    pub fn push_system(&mut self, text: impl Into<String>) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.text = text.into(),
            _ => self.messages.insert(0, Message::system(text)),
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>, image_base64: Option<String>) {
        self.messages.push(Message::user(text, image_base64));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Trim the history to bound context growth.
    ///
    /// Two strategies, applied in order every step:
    /// 1. strip images from every message except the system message and
    ///    the two most recent ones (stale screenshots add no value);
    /// 2. if more than `max_messages` non-system messages remain, keep
    ///    only the system message plus the most recent `max_messages`.
    pub fn trim(&mut self, max_messages: usize) {
        if self.messages.len() <= 1 {
            return;
        }

        let len = self.messages.len();
        for (i, message) in self.messages.iter_mut().enumerate() {
            if i == 0 || i >= len - 2 {
                continue;
            }
            message.drop_image();
        }

        if self.messages.len() > max_messages + 1 {
            let tail_start = self.messages.len() - max_messages;
            self.messages.drain(1..tail_start);
            tracing::debug!("Context trimmed to {} messages", self.messages.len());
        }
    }
}
