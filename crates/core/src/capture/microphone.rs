use crate::audio::{downmix_to_mono, i16_to_f32_pcm, CapturedAudio};
use crate::capture::{AudioCapture, CaptureError};
use crate::config::{RecordingDuration, SampleRate};
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::cpal::{self, SampleFormat, SupportedStreamConfig};
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "capture::microphone";

/// Fixed-length recording from the default (or a named) input device.
///
/// The cpal stream lives on a blocking thread for the whole recording
/// because streams are not `Send` on every platform.
#[derive(Clone, Debug)]
pub struct MicrophoneCapture {
    sample_rate: SampleRate,
    input_device_name: Option<String>,
}

impl MicrophoneCapture {
    pub fn new(sample_rate: SampleRate) -> Self {
        Self {
            sample_rate,
            input_device_name: None,
        }
    }

    pub fn with_input_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.input_device_name = Some(name.into());
        self
    }

    fn select_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        if let Some(wanted) = self.input_device_name.as_deref() {
            let wanted_norm = wanted.trim().to_ascii_lowercase();
            let found = host
                .input_devices()
                .map_err(|e| CaptureError::InputUnavailable(e.to_string()))?
                .find(|d| {
                    d.name()
                        .map(|n| n.trim().to_ascii_lowercase() == wanted_norm)
                        .unwrap_or(false)
                });
            match found {
                Some(device) => return Ok(device),
                None => tracing::warn!(
                    target: LOG_TARGET,
                    wanted_device = %wanted,
                    "configured input device not found; falling back to default input device"
                ),
            }
        }
        host.default_input_device()
            .ok_or_else(|| CaptureError::InputUnavailable("no input device available".to_owned()))
    }

    /// Prefers a config running at the requested rate, otherwise the
    /// device default.
    fn select_config(&self, device: &cpal::Device) -> Result<SupportedStreamConfig, CaptureError> {
        let wanted = cpal::SampleRate(self.sample_rate.hz());
        let preferred = device.supported_input_configs().ok().and_then(|mut configs| {
            configs.find(|c| {
                matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16)
                    && c.min_sample_rate() <= wanted
                    && c.max_sample_rate() >= wanted
            })
        });
        match preferred {
            Some(range) => Ok(range.with_sample_rate(wanted)),
            None => device
                .default_input_config()
                .map_err(|e| CaptureError::InputUnavailable(e.to_string())),
        }
    }

    fn record_blocking(&self, duration: RecordingDuration) -> Result<CapturedAudio, CaptureError> {
        let device = self.select_device()?;
        let supported = self.select_config(&device)?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let channels = config.channels;
        let sample_rate_hz = config.sample_rate.0;

        tracing::debug!(
            target: LOG_TARGET,
            device = %device.name().unwrap_or_default(),
            sample_rate_hz,
            channels,
            secs = duration.secs(),
            "recording"
        );

        let wanted_samples = duration
            .frames_for_sample_rate(sample_rate_hz)
            .saturating_mul(usize::from(channels));
        let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::with_capacity(wanted_samples)));
        let stream_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let on_error = {
            let stream_error = Arc::clone(&stream_error);
            move |err: cpal::StreamError| {
                tracing::error!(target: LOG_TARGET, error = %err, "audio capture error");
                if let Ok(mut slot) = stream_error.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            }
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                let buffer = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(data);
                        }
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let buffer = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend(i16_to_f32_pcm(data));
                        }
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(CaptureError::InputUnavailable(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }
        .map_err(|e| CaptureError::StreamFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamFailed(e.to_string()))?;
        std::thread::sleep(duration.duration());
        drop(stream);

        if let Some(err) = stream_error.lock().ok().and_then(|mut e| e.take()) {
            return Err(CaptureError::StreamFailed(err));
        }

        let mut interleaved = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        interleaved.truncate(wanted_samples);
        let samples = downmix_to_mono(&interleaved, channels);
        if samples.is_empty() {
            return Err(CaptureError::NoAudio);
        }

        tracing::info!(
            target: LOG_TARGET,
            frames = samples.len(),
            sample_rate_hz,
            "recording complete"
        );
        Ok(CapturedAudio {
            sample_rate_hz,
            samples,
        })
    }
}

impl AudioCapture for MicrophoneCapture {
    fn record(
        &self,
        duration: RecordingDuration,
    ) -> BoxFuture<'_, Result<CapturedAudio, CaptureError>> {
        let this = self.clone();
        async move {
            tokio::task::spawn_blocking(move || this.record_blocking(duration))
                .await
                .map_err(|e| CaptureError::StreamFailed(format!("capture task failed: {e}")))?
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn records_from_default_device_ignored() {
        // Intentionally ignored: needs a real input device.
        let mic = MicrophoneCapture::new(SampleRate::default());
        let audio = mic
            .record(RecordingDuration::new(3).unwrap())
            .await
            .unwrap();
        assert!(!audio.is_empty());
    }
}
