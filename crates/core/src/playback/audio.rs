use crate::playback::{PlaybackError, PlaybackSink};
use crate::tts::SpeechAudio;
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::cpal::traits::DeviceTrait;
use rodio::cpal::traits::HostTrait;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, StreamError};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

struct RateLimitedWarn {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimitedWarn {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn should_log(&self) -> bool {
        let mut guard = match self.last.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Instant::now();
        match *guard {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *guard = Some(now);
                true
            }
        }
    }
}

/// Plays encoded speech (mp3/wav) on the default or a named output device
/// and resolves once the clip has finished.
///
/// The output stream is opened on the blocking thread that plays the clip
/// and lives until the clip ends, since cpal streams cannot move between
/// threads on every platform.
#[derive(Clone)]
pub struct AudioPlaybackSink {
    output_device_name: Option<String>,
    disabled: Arc<AtomicBool>,
    disabled_details: Arc<OnceLock<String>>,
    bad_audio_warn: Arc<RateLimitedWarn>,
}

impl AudioPlaybackSink {
    pub fn new() -> Self {
        Self {
            output_device_name: None,
            disabled: Arc::new(AtomicBool::new(false)),
            disabled_details: Arc::new(OnceLock::new()),
            bad_audio_warn: Arc::new(RateLimitedWarn::new(Duration::from_secs(5))),
        }
    }

    pub fn with_output_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    /// Set once no output device could be found; later clips are dropped
    /// silently instead of failing every turn.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_details.get().map(String::as_str)
    }
}

impl Default for AudioPlaybackSink {
    fn default() -> Self {
        Self::new()
    }
}

fn open_output_stream(output_device_name: Option<&str>) -> Result<OutputStream, PlaybackError> {
    tracing::debug!(
        configured_output_device = %output_device_name.unwrap_or("<default>"),
        "opening Rodio OutputStream"
    );

    let fallback_context = match output_device_name {
        Some(wanted) => match open_named_output_stream(wanted) {
            Ok(stream) => return Ok(stream),
            Err(NamedDeviceStreamError::DeviceNotFound { wanted, available }) => {
                tracing::warn!(
                    wanted_device = %wanted,
                    available_devices = %format_device_list(&available),
                    "configured output device not found; falling back to default output device"
                );
                "default-device fallback after named device not found"
            }
            Err(NamedDeviceStreamError::OpenFailed {
                wanted,
                error,
                available,
            }) => {
                tracing::warn!(
                    wanted_device = %wanted,
                    error = %error,
                    available_devices = %format_device_list(&available),
                    "failed to open configured output device; falling back to default output device"
                );
                "default-device fallback after named device open failed"
            }
        },
        None => "open default output stream",
    };

    OutputStreamBuilder::open_default_stream().map_err(|e| PlaybackError::AudioOutputUnavailable {
        details: format_stream_error_details(e, output_device_name, fallback_context),
    })
}

fn play_blocking(
    output_device_name: Option<&str>,
    audio: SpeechAudio,
) -> Result<(), PlaybackError> {
    let source = Decoder::new(Cursor::new(audio.bytes.to_vec()))
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;

    let mut stream = open_output_stream(output_device_name)?;
    stream.log_on_drop(false);
    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

impl PlaybackSink for AudioPlaybackSink {
    fn play(&self, audio: SpeechAudio) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            if self.disabled.load(Ordering::Relaxed) {
                return Ok(());
            }

            if audio.is_empty() {
                if self.bad_audio_warn.should_log() {
                    tracing::warn!(format = ?audio.format, "skipping playback of empty audio (rate-limited)");
                } else {
                    tracing::debug!(format = ?audio.format, "skipping playback of empty audio");
                }
                return Ok(());
            }

            let device = self.output_device_name.clone();
            let result = tokio::task::spawn_blocking(move || play_blocking(device.as_deref(), audio))
                .await
                .map_err(|e| PlaybackError::Task(e.to_string()))?;

            if let Err(PlaybackError::AudioOutputUnavailable { details }) = &result {
                if details.contains("NoDevice") {
                    self.disabled.store(true, Ordering::Relaxed);
                    let _ = self.disabled_details.set(details.clone());
                }
            }
            result
        }
        .boxed()
    }
}

#[derive(Debug)]
enum NamedDeviceStreamError {
    DeviceNotFound {
        wanted: String,
        available: Vec<String>,
    },
    OpenFailed {
        wanted: String,
        error: StreamError,
        available: Vec<String>,
    },
}

fn normalize_device_name(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn open_named_output_stream(wanted: &str) -> Result<OutputStream, NamedDeviceStreamError> {
    let wanted_norm = normalize_device_name(wanted);

    let host = rodio::cpal::default_host();
    let mut available: Vec<String> = Vec::new();
    let mut selected = None;

    if let Ok(devices) = host.output_devices() {
        for d in devices {
            let name = d.name().unwrap_or_else(|_| "<unnamed>".to_owned());
            if selected.is_none() && normalize_device_name(&name) == wanted_norm {
                selected = Some(d);
            }
            available.push(name);
        }
    }

    let Some(device) = selected else {
        return Err(NamedDeviceStreamError::DeviceNotFound {
            wanted: wanted.to_owned(),
            available,
        });
    };

    OutputStreamBuilder::from_device(device)
        .and_then(|b| b.open_stream_or_fallback())
        .map_err(|error| NamedDeviceStreamError::OpenFailed {
            wanted: wanted.to_owned(),
            error,
            available,
        })
}

fn format_device_list(devices: &[String]) -> String {
    if devices.is_empty() {
        return "<unknown>".to_owned();
    }
    devices.join(", ")
}

fn format_stream_error_details(err: StreamError, wanted: Option<&str>, context: &str) -> String {
    let mut s = format!("{context}: {err:?}");
    if let Some(w) = wanted {
        s.push_str(&format!(" (configured_device={w})"));
    }
    #[cfg(feature = "playback-device-enum")]
    {
        if let Ok(devices) = enumerate_output_device_names() {
            if devices.is_empty() {
                s.push_str("; available_output_devices=<none>");
            } else {
                s.push_str("; available_output_devices=");
                s.push_str(&devices.join(", "));
            }
        }
    }
    s
}

#[cfg(feature = "playback-device-enum")]
pub fn enumerate_output_device_names() -> Result<Vec<String>, PlaybackError> {
    let host = rodio::cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlaybackError::AudioOutputUnavailable {
            details: format!("failed to list output devices: {e}"),
        })?;

    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_owned()))
        .collect())
}
