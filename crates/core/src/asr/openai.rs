use crate::asr::{Transcriber, TranscriptionError};
use crate::audio::AudioClip;
use crate::config::{endpoint, ApiKey};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const DEFAULT_MODEL: &str = "whisper-1";

/// Hosted transcription through the `/audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct OpenAiTranscriber {
    client: Client,
    api_key: ApiKey,
    base_url: Url,
    model: String,
    language: Option<String>,
}

impl OpenAiTranscriber {
    pub fn new(api_key: ApiKey, base_url: Url) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model: DEFAULT_MODEL.to_owned(),
            language: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// ISO-639-1 hint; without it the service detects the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, audio: AudioClip) -> BoxFuture<'_, Result<String, TranscriptionError>> {
        let this = self.clone();
        async move {
            if audio.is_empty() {
                return Err(TranscriptionError::UnsupportedInput("empty audio clip".to_owned()));
            }
            tracing::debug!(audio_bytes = audio.bytes.len(), format = ?audio.format, "starting transcription");

            let part = Part::bytes(audio.bytes.to_vec())
                .file_name(audio.file_name("audio"))
                .mime_str(audio.format.mime_type())
                .map_err(|e| TranscriptionError::UnsupportedInput(e.to_string()))?;
            let mut form = Form::new().part("file", part).text("model", this.model.clone());
            if let Some(lang) = this.language.clone() {
                form = form.text("language", lang);
            }

            let response = this
                .client
                .post(endpoint(&this.base_url, "audio/transcriptions"))
                .bearer_auth(this.api_key.expose())
                .multipart(form)
                .send()
                .await
                .map_err(|e| TranscriptionError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, "transcription api error");
                return Err(TranscriptionError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: TranscriptionResponse = response
                .json()
                .await
                .map_err(|e| TranscriptionError::InvalidOutput(format!("failed to parse JSON: {e}")))?;

            let text = parsed.text.trim().to_owned();
            tracing::info!(transcript = %text, "transcription complete");
            Ok(text)
        }
        .boxed()
    }
}
