use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a chat exchange. The serialized shape matches the
/// chat-completions wire format (`{"role": "...", "content": "..."}`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chronological user/assistant transcript of a session.
///
/// Entries are only ever added as a complete user + assistant pair, so the
/// length is always even. Existing entries are never edited; the only other
/// mutation is [`ConversationHistory::clear`].
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Appends one finished exchange. Both entries land in a single call so
    /// no caller can observe a user message without its reply.
    pub(crate) fn commit_exchange(&mut self, user: String, assistant: String) {
        self.messages.reserve(2);
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
    }

    /// Request body for the chat model: the profile prompt first, then the
    /// stored transcript, then the pending user input. The system prompt is
    /// never written back into the history.
    pub fn request_with(&self, system_prompt: &str, pending_user: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 2);
        out.push(Message::system(system_prompt));
        out.extend(
            self.messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        out.push(Message::user(pending_user));
        out
    }

    /// `Customer: ...` / `Assistant: ...` lines used by the analyzer.
    pub fn transcript_lines(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "Customer",
                    Role::Assistant | Role::System => "Assistant",
                };
                format!("{speaker}: {}", m.content)
            })
            .collect()
    }
}
