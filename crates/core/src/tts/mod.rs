mod fallback;
mod google;
mod openai;

use crate::audio::AudioClip;
use crate::config::LanguageCode;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use fallback::FallbackSynthesizer;
pub use google::{split_for_tts, GoogleTranslateTts};
pub use openai::OpenAiTts;

/// Encoded speech, ready to hand to a player or a browser.
pub type SpeechAudio = AudioClip;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtsRequest {
    pub text: String,
    pub lang: LanguageCode,
}

impl TtsRequest {
    pub fn new<S: Into<String>>(text: S, lang: LanguageCode) -> Self {
        Self {
            text: text.into(),
            lang,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("tts quota exhausted")]
    QuotaExhausted,

    #[error("network error: {0}")]
    Network(String),

    #[error("tts api error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>>;
}

impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        (**self).synthesize(request)
    }
}
