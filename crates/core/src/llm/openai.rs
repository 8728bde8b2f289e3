use crate::config::{endpoint, ApiKey, LlmConfig};
use crate::conversation::Message;
use crate::llm::{ChatModel, GenerationError};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const LOG_TARGET: &str = "llm::openai";

/// Client for the `/chat/completions` endpoint (OpenAI or any compatible
/// server reachable at `base_url`).
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    api_key: ApiKey,
    base_url: Url,
    config: LlmConfig,
    max_tokens: Option<u32>,
    retry: RetryConfig,
}

impl OpenAiChatClient {
    pub fn new(api_key: ApiKey, base_url: Url, config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            config,
            max_tokens: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Startup credential check: a one-token completion. Quota problems come
    /// back as [`GenerationError::QuotaExceeded`] so callers can say so.
    pub async fn verify(&self) -> Result<(), GenerationError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: &[Message::user("Hi")],
            temperature: None,
            max_tokens: Some(1),
        };
        match self.send_once(&request).await {
            Ok(_) | Err(GenerationError::EmptyReply) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn send_once(&self, body: &ChatCompletionRequest<'_>) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_owned());
            return Err(map_http_error(status.as_u16(), text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("failed to parse JSON: {e}")))?;

        extract_reply(parsed)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn map_http_error(status: u16, body: String) -> GenerationError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(&body).ok();
    let is_quota = match &parsed {
        Some(env) => {
            env.error.code.as_deref() == Some("insufficient_quota")
                || env.error.kind.as_deref() == Some("insufficient_quota")
        }
        None => body.contains("insufficient_quota"),
    };
    if is_quota {
        let message = parsed
            .map(|env| env.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        return GenerationError::QuotaExceeded(message);
    }
    GenerationError::Api { status, body }
}

fn extract_reply(response: ChatCompletionResponse) -> Result<String, GenerationError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_owned()))?
        .message
        .content
        .unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        return Err(GenerationError::EmptyReply);
    }
    Ok(content.to_owned())
}

impl ChatModel for OpenAiChatClient {
    fn generate(&self, messages: Vec<Message>) -> BoxFuture<'_, Result<String, GenerationError>> {
        async move {
            tracing::debug!(
                target: LOG_TARGET,
                model = %self.config.model,
                messages = messages.len(),
                "requesting completion"
            );
            let request = ChatCompletionRequest {
                model: &self.config.model,
                messages: &messages,
                temperature: Some(self.config.temperature),
                max_tokens: self.max_tokens,
            };
            let request = &request;
            let reply = retry_with_backoff(
                &self.retry,
                move || self.send_once(request),
                GenerationError::is_retryable,
            )
            .await?;
            tracing::debug!(target: LOG_TARGET, reply_chars = reply.chars().count(), "completion received");
            Ok(reply)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_wire_shape() {
        let messages = [Message::system("sys"), Message::user("hi")];
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: Some(0.7),
            max_tokens: None,
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["model"], "gpt-3.5-turbo");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "hi");
        assert!(v.get("max_tokens").is_none());
    }

    #[test]
    fn quota_errors_are_recognized() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
        match map_http_error(429, body.to_owned()) {
            GenerationError::QuotaExceeded(m) => assert!(m.contains("exceeded")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_http_errors_keep_status() {
        let err = map_http_error(500, "upstream down".to_owned());
        assert!(matches!(err, GenerationError::Api { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn extract_reply_trims_and_rejects_empty() {
        let ok: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" We are open 9-5. "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(ok).unwrap(), "We are open 9-5.");

        let empty: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(matches!(extract_reply(empty), Err(GenerationError::EmptyReply)));

        let none: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_reply(none),
            Err(GenerationError::InvalidResponse(_))
        ));
    }
}
