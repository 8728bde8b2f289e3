use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError, TtsRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);
const LOG_TARGET: &str = "tts::fallback";

/// Primary synthesizer with a secondary behind it. Any primary error falls
/// through to the secondary for that request; a quota error additionally
/// parks the primary for `cooldown` before it is tried again.
#[derive(Clone)]
pub struct FallbackSynthesizer<P, S> {
    primary: P,
    secondary: S,
    cooldown: Duration,
    state: Arc<FallbackState>,
}

struct FallbackState {
    parked: AtomicBool,
    parked_at: Mutex<Option<Instant>>,
}

impl<P, S> FallbackSynthesizer<P, S>
where
    P: SpeechSynthesizer,
    S: SpeechSynthesizer,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            cooldown: DEFAULT_COOLDOWN,
            state: Arc::new(FallbackState {
                parked: AtomicBool::new(false),
                parked_at: Mutex::new(None),
            }),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn is_using_fallback(&self) -> bool {
        self.state.parked.load(Ordering::Relaxed)
    }

    async fn park_primary(&self) {
        self.state.parked.store(true, Ordering::Relaxed);
        *self.state.parked_at.lock().await = Some(Instant::now());
    }

    async fn unpark_primary(&self) {
        self.state.parked.store(false, Ordering::Relaxed);
        *self.state.parked_at.lock().await = None;
    }

    async fn primary_due(&self) -> bool {
        if !self.state.parked.load(Ordering::Relaxed) {
            return true;
        }
        self.state
            .parked_at
            .lock()
            .await
            .map(|t| t.elapsed() >= self.cooldown)
            .unwrap_or(true)
    }
}

impl<P, S> SpeechSynthesizer for FallbackSynthesizer<P, S>
where
    P: SpeechSynthesizer,
    S: SpeechSynthesizer,
{
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        async move {
            if !self.primary_due().await {
                return self.secondary.synthesize(request).await;
            }

            let was_parked = self.is_using_fallback();
            match self.primary.synthesize(request.clone()).await {
                Ok(audio) => {
                    if was_parked {
                        self.unpark_primary().await;
                        tracing::info!(target: LOG_TARGET, "primary tts recovered");
                    }
                    Ok(audio)
                }
                Err(SynthesisError::EmptyText) => Err(SynthesisError::EmptyText),
                Err(SynthesisError::QuotaExhausted) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        cooldown_secs = self.cooldown.as_secs(),
                        "primary tts quota exhausted, switching to secondary"
                    );
                    self.park_primary().await;
                    self.secondary.synthesize(request).await
                }
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "primary tts failed, using secondary for this request");
                    self.secondary.synthesize(request).await
                }
            }
        }
        .boxed()
    }
}
