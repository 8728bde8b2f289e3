use crate::playback::{PlaybackError, PlaybackSink};
use crate::tts::SpeechAudio;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Discards audio. Used when the front end plays replies itself or when
/// running without an output device.
#[derive(Clone, Debug, Default)]
pub struct NullPlaybackSink;

impl NullPlaybackSink {
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackSink for NullPlaybackSink {
    fn play(&self, audio: SpeechAudio) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            tracing::trace!(bytes = audio.bytes.len(), "discarding audio");
            Ok(())
        }
        .boxed()
    }
}
