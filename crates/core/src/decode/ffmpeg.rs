use crate::audio::AudioClip;
use crate::decode::{
    parse_f32le_mono, AudioDecoder, DecodeError, PcmChunk, Result, TRANSCRIPTION_SAMPLE_RATE_HZ,
};
use bytes::Bytes;
use ffmpeg_sidecar::{download, paths::ffmpeg_path};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Decodes through an ffmpeg child process, downloading ffmpeg on first use
/// if it is not already on the machine.
#[derive(Clone, Debug, Default)]
pub struct FfmpegAudioDecoder;

impl FfmpegAudioDecoder {
    pub fn new() -> Self {
        Self
    }

    fn ensure_ffmpeg_available(&self) -> Result<()> {
        download::auto_download().map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))
    }

    async fn decode_with_ffmpeg(&self, input: Bytes) -> Result<Vec<f32>> {
        let rate = TRANSCRIPTION_SAMPLE_RATE_HZ.to_string();
        let mut child = tokio::process::Command::new(ffmpeg_path())
            .args([
                "-hide_banner",
                "-nostdin",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-vn",
                "-sn",
                "-dn",
                "-ac",
                "1",
                "-ar",
                rate.as_str(),
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "pipe:1",
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            DecodeError::FfmpegFailed("ffmpeg stdin unavailable (pipe not created)".to_owned())
        })?;

        // stdin is fed from its own task so a full stdout pipe cannot deadlock us.
        let stdin_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        stdin_task
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr_s = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(DecodeError::FfmpegFailed(format!(
                "exit_code={:?} stderr={stderr_s}",
                output.status.code()
            )));
        }

        parse_f32le_mono(&output.stdout)
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(&self, clip: AudioClip) -> BoxFuture<'_, Result<PcmChunk>> {
        let this = self.clone();
        async move {
            tokio::task::spawn_blocking(move || this.ensure_ffmpeg_available())
                .await
                .map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))??;
            let samples = self.decode_with_ffmpeg(clip.bytes).await?;
            let chunk = PcmChunk {
                sample_rate_hz: TRANSCRIPTION_SAMPLE_RATE_HZ,
                samples,
            };
            tracing::debug!(
                format = ?clip.format,
                duration_ms = chunk.duration().as_millis() as u64,
                "decoded clip"
            );
            Ok(chunk)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;

    #[tokio::test]
    #[ignore]
    async fn ffmpeg_decode_smoke_ignored() {
        // Intentionally ignored: requires ffmpeg presence / download.
        let wav = crate::audio::encode_wav(&[0.0; 1600], 16_000).unwrap();
        let chunk = FfmpegAudioDecoder::new()
            .decode(AudioClip::new(AudioFormat::Wav, wav))
            .await
            .unwrap();
        assert_eq!(chunk.sample_rate_hz, 16_000);
    }
}
