mod microphone;

use crate::audio::CapturedAudio;
use crate::config::RecordingDuration;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use microphone::MicrophoneCapture;

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("audio input unavailable: {0}")]
    InputUnavailable(String),

    #[error("recording failed: {0}")]
    StreamFailed(String),

    #[error("recording produced no audio")]
    NoAudio,

    #[error("recording could not be encoded: {0}")]
    Encode(String),
}

pub trait AudioCapture: Send + Sync {
    fn record(&self, duration: RecordingDuration)
        -> BoxFuture<'_, Result<CapturedAudio, CaptureError>>;
}

impl<T: AudioCapture + ?Sized> AudioCapture for Arc<T> {
    fn record(
        &self,
        duration: RecordingDuration,
    ) -> BoxFuture<'_, Result<CapturedAudio, CaptureError>> {
        (**self).record(duration)
    }
}
