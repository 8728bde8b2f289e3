mod audio;
mod null;

use crate::tts::SpeechAudio;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use audio::AudioPlaybackSink;
#[cfg(feature = "playback-device-enum")]
pub use audio::enumerate_output_device_names;
pub use null::NullPlaybackSink;

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },

    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("playback task failed: {0}")]
    Task(String),
}

pub trait PlaybackSink: Send + Sync {
    fn play(&self, audio: SpeechAudio) -> BoxFuture<'_, Result<(), PlaybackError>>;
}

impl<T: PlaybackSink + ?Sized> PlaybackSink for Arc<T> {
    fn play(&self, audio: SpeechAudio) -> BoxFuture<'_, Result<(), PlaybackError>> {
        (**self).play(audio)
    }
}
