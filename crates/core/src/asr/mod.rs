mod openai;
mod sherpa;

use crate::audio::AudioClip;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use openai::OpenAiTranscriber;
pub use sherpa::{parse_sherpa_output, SherpaOnnxTranscriber};

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("no speech detected")]
    EmptyTranscript,

    #[error("unsupported audio input: {0}")]
    UnsupportedInput(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("transcription api error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("transcriber process failed: {0}")]
    Process(String),

    #[error("invalid transcriber output: {0}")]
    InvalidOutput(String),
}

/// Speech-to-text seam. Implementations may return an empty string for
/// silence; callers treat that as [`TranscriptionError::EmptyTranscript`].
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: AudioClip) -> BoxFuture<'_, Result<String, TranscriptionError>>;
}

impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: AudioClip) -> BoxFuture<'_, Result<String, TranscriptionError>> {
        (**self).transcribe(audio)
    }
}
