//! Audio containers shared by the capture, transcription, synthesis and
//! playback seams, plus the small amount of sample handling the assistant
//! does itself (mono downmix and WAV encoding).

mod workdir;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

pub use workdir::WorkDir;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("unsupported audio format {0:?}, expected wav or mp3")]
    UnsupportedFormat(String),

    #[error("wav encoding failed: {0}")]
    WavEncode(#[from] hound::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Result<Self, AudioError> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            _ => Err(AudioError::UnsupportedFormat(ext.to_owned())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }
}

/// An encoded audio file held in memory: an upload, an encoded recording,
/// or synthesized speech.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    pub format: AudioFormat,
    pub bytes: Bytes,
}

impl AudioClip {
    pub fn new(format: AudioFormat, bytes: impl Into<Bytes>) -> Self {
        Self {
            format,
            bytes: bytes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.format.extension())
    }
}

/// Mono f32 samples straight from the input device.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedAudio {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl CapturedAudio {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_frames(self.sample_rate_hz, self.samples.len())
    }

    pub fn to_wav_clip(&self) -> Result<AudioClip, AudioError> {
        let wav = encode_wav(&self.samples, self.sample_rate_hz)?;
        Ok(AudioClip::new(AudioFormat::Wav, wav))
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels);
    if ch <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

pub fn duration_from_frames(sample_rate_hz: u32, frames: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

/// 16-bit mono PCM WAV, the input format every transcription backend accepts.
pub fn encode_wav(samples: &[f32], sample_rate_hz: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * f32::from(i16::MAX)) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_parsing_is_case_insensitive_and_strict() {
        assert_eq!(AudioFormat::from_extension("WAV").unwrap(), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_extension(".mp3").unwrap(), AudioFormat::Mp3);
        assert!(matches!(
            AudioFormat::from_extension("ogg"),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn downmix_averages_stereo_frames() {
        let mono = downmix_to_mono(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        assert_eq!(downmix_to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn i16_to_f32_basic() {
        let v = i16_to_f32_pcm(&[-32768, 0, 32767]);
        assert!((v[0] + 1.0).abs() < 1e-6);
        assert!(v[1].abs() < 1e-6);
        assert!(v[2] > 0.9999);
    }

    #[test]
    fn wav_encoding_is_readable_by_hound() {
        let captured = CapturedAudio {
            sample_rate_hz: 16_000,
            samples: vec![0.0, 0.5, -0.5, 2.0],
        };
        let clip = captured.to_wav_clip().unwrap();
        assert_eq!(clip.format, AudioFormat::Wav);
        assert_eq!(&clip.bytes[..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(clip.bytes.to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3], i16::MAX);
    }

    #[test]
    fn captured_duration() {
        let captured = CapturedAudio {
            sample_rate_hz: 16_000,
            samples: vec![0.0; 48_000],
        };
        assert_eq!(captured.duration(), Duration::from_secs(3));
    }
}
