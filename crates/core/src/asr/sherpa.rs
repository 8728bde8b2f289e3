use crate::asr::{Transcriber, TranscriptionError};
use crate::audio::{encode_wav, AudioClip, AudioFormat, WorkDir};
use crate::config::SherpaConfig;
use crate::decode::AudioDecoder;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::process::Command;

const LOG_TARGET: &str = "asr::sherpa";

/// Offline transcription by running the `sherpa-onnx-offline` binary on a
/// WAV file. MP3 clips are converted through the configured decoder first.
#[derive(Clone)]
pub struct SherpaOnnxTranscriber {
    config: SherpaConfig,
    workdir: Arc<WorkDir>,
    decoder: Option<Arc<dyn AudioDecoder>>,
    counter: Arc<AtomicU64>,
}

impl SherpaOnnxTranscriber {
    pub fn new(config: SherpaConfig, workdir: Arc<WorkDir>) -> Self {
        Self {
            config,
            workdir,
            decoder: None,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    async fn to_wav(&self, clip: AudioClip) -> Result<AudioClip, TranscriptionError> {
        match clip.format {
            AudioFormat::Wav => Ok(clip),
            AudioFormat::Mp3 => {
                let decoder = self.decoder.as_ref().ok_or_else(|| {
                    TranscriptionError::UnsupportedInput(
                        "mp3 input needs an audio decoder for this backend".to_owned(),
                    )
                })?;
                let pcm = decoder
                    .decode(clip)
                    .await
                    .map_err(|e| TranscriptionError::UnsupportedInput(e.to_string()))?;
                let wav = encode_wav(&pcm.samples, pcm.sample_rate_hz)
                    .map_err(|e| TranscriptionError::UnsupportedInput(e.to_string()))?;
                Ok(AudioClip::new(AudioFormat::Wav, wav))
            }
        }
    }
}

impl Transcriber for SherpaOnnxTranscriber {
    fn transcribe(&self, audio: AudioClip) -> BoxFuture<'_, Result<String, TranscriptionError>> {
        async move {
            let wav = self.to_wav(audio).await?;
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let wav_path = self
                .workdir
                .write_clip(&format!("asr-input-{n}"), &wav)
                .await
                .map_err(|e| TranscriptionError::Process(format!("failed to stage audio: {e}")))?;

            let tokens = self.config.tokens_path();
            let model = self.config.model_path();
            tracing::debug!(
                target: LOG_TARGET,
                binary = %self.config.binary.display(),
                model = %model.display(),
                input = %wav_path.display(),
                "running sherpa-onnx"
            );

            let output = Command::new(&self.config.binary)
                .arg(format!("--tokens={}", tokens.display()))
                .arg(format!("--omnilingual-asr-model={}", model.display()))
                .arg(&wav_path)
                .stdin(std::process::Stdio::null())
                .output()
                .await;
            if let Err(e) = tokio::fs::remove_file(&wav_path).await {
                tracing::debug!(target: LOG_TARGET, path = %wav_path.display(), error = %e, "failed to remove staged audio");
            }
            let output = output.map_err(|e| {
                let path = self.config.binary.display();
                TranscriptionError::Process(format!("failed to spawn {path}: {e}"))
            })?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(
                target: LOG_TARGET,
                code = ?output.status.code(),
                stdout = %stdout,
                stderr = %stderr,
                "sherpa-onnx finished"
            );

            if !output.status.success() {
                let combined = format!("{stdout}\n{stderr}");
                return Err(TranscriptionError::Process(format!(
                    "sherpa-onnx exited with {}: {}",
                    output.status,
                    combined.trim()
                )));
            }

            let text = parse_sherpa_output(&stdout, &stderr)?;
            tracing::info!(target: LOG_TARGET, transcript = %text, "transcription complete");
            Ok(text)
        }
        .boxed()
    }
}

/// The recognizer prints progress on both streams and the result as a JSON
/// object on a line of its own; the last such line wins.
pub fn parse_sherpa_output(stdout: &str, stderr: &str) -> Result<String, TranscriptionError> {
    let combined = format!("{stdout}\n{stderr}");
    if combined.trim().is_empty() {
        return Err(TranscriptionError::InvalidOutput(
            "no output from sherpa-onnx".to_owned(),
        ));
    }

    let json_line = combined
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{') && l.ends_with('}'))
        .last()
        .ok_or_else(|| {
            TranscriptionError::InvalidOutput(format!(
                "no transcription JSON found: {}",
                combined.trim()
            ))
        })?;

    let value: serde_json::Value = serde_json::from_str(json_line)
        .map_err(|e| TranscriptionError::InvalidOutput(format!("bad JSON {json_line}: {e}")))?;
    Ok(value
        .get("text")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned())
}
