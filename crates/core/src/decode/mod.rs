#[cfg(feature = "ffmpeg-sidecar")]
mod ffmpeg;

use crate::audio::AudioClip;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "ffmpeg-sidecar")]
pub use ffmpeg::FfmpegAudioDecoder;

pub const TRANSCRIPTION_SAMPLE_RATE_HZ: u32 = 16_000;

/// Mono f32 PCM produced by a decoder.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PcmChunk {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl PcmChunk {
    pub fn duration(&self) -> Duration {
        crate::audio::duration_from_frames(self.sample_rate_hz, self.samples.len())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Turns an encoded clip (an mp3 upload, typically) into 16 kHz mono PCM.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, clip: AudioClip) -> BoxFuture<'_, Result<PcmChunk>>;
}

pub fn parse_f32le_mono(raw: &[u8]) -> Result<Vec<f32>> {
    if raw.len() % 4 != 0 {
        return Err(DecodeError::InvalidPcm(format!(
            "f32le byte length must be multiple of 4, got {}",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
