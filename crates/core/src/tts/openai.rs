use crate::audio::{AudioClip, AudioFormat};
use crate::config::{endpoint, ApiKey};
use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError, TtsRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use url::Url;

#[derive(Clone)]
pub struct OpenAiTts {
    client: Client,
    api_key: ApiKey,
    base_url: Url,
    model: String,
    voice: String,
    speed: f32,
}

impl OpenAiTts {
    pub fn new(api_key: ApiKey, base_url: Url) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
            speed: 1.0,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(0.25, 4.0);
        self
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

impl SpeechSynthesizer for OpenAiTts {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        async move {
            let text = request.text.trim();
            if text.is_empty() {
                return Err(SynthesisError::EmptyText);
            }
            // The service infers the language from the text itself.
            tracing::debug!(lang = %request.lang, chars = text.chars().count(), "requesting speech");

            let body = SpeechRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                speed: self.speed,
                response_format: "mp3",
            };
            let response = self
                .client
                .post(endpoint(&self.base_url, "audio/speech"))
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await
                .map_err(|e| SynthesisError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 && body.contains("insufficient_quota") {
                    return Err(SynthesisError::QuotaExhausted);
                }
                return Err(SynthesisError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let audio = response
                .bytes()
                .await
                .map_err(|e| SynthesisError::Network(e.to_string()))?;
            if audio.is_empty() {
                return Err(SynthesisError::Other("tts returned no audio".to_owned()));
            }
            Ok(AudioClip::new(AudioFormat::Mp3, audio))
        }
        .boxed()
    }
}
