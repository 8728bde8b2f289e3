mod openai;

use crate::conversation::Message;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use openai::OpenAiChatClient;

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("chat api error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("api quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("invalid chat response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty reply")]
    EmptyReply,
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Network(_) => true,
            GenerationError::Api { status, .. } => crate::util::is_http_retryable(*status),
            _ => false,
        }
    }
}

/// Chat-completion seam. `messages` always starts with exactly one system
/// message followed by alternating user/assistant turns.
pub trait ChatModel: Send + Sync {
    fn generate(&self, messages: Vec<Message>) -> BoxFuture<'_, Result<String, GenerationError>>;
}

impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    fn generate(&self, messages: Vec<Message>) -> BoxFuture<'_, Result<String, GenerationError>> {
        (**self).generate(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_http_status() {
        assert!(GenerationError::Network("reset".into()).is_retryable());
        assert!(GenerationError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!GenerationError::Api { status: 401, body: String::new() }.is_retryable());
        assert!(!GenerationError::QuotaExceeded("billing".into()).is_retryable());
        assert!(!GenerationError::EmptyReply.is_retryable());
    }
}
