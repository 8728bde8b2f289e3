//! One conversational turn: capture, transcribe, generate, synthesize.
//!
//! The stages run strictly in sequence against a borrowed [`SessionState`].
//! History is only touched once the model has replied, and then both sides
//! of the exchange are written in one step. A failed or dropped turn leaves
//! the session exactly as it found it.

use crate::asr::{TranscriptionError, Transcriber};
use crate::audio::AudioClip;
use crate::capture::{AudioCapture, CaptureError};
use crate::config::{AppConfig, LanguageCode};
use crate::llm::{ChatModel, GenerationError};
use crate::profile::profile;
use crate::session::SessionState;
use crate::tts::{SpeechAudio, SpeechSynthesizer, TtsRequest};

const LOG_TARGET: &str = "turn";

#[derive(thiserror::Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("empty input")]
    EmptyInput,
}

impl TurnError {
    /// Message shown to the user; every turn failure is recoverable by trying
    /// again.
    pub fn user_notice(&self) -> String {
        match self {
            TurnError::Capture(e) => format!("Recording failed: {e}"),
            TurnError::Transcription(TranscriptionError::EmptyTranscript) => {
                "Audio transcription failed: no speech detected, please try again".to_owned()
            }
            TurnError::Transcription(e) => format!("Audio transcription failed: {e}"),
            TurnError::Generation(GenerationError::QuotaExceeded(_)) => {
                "API quota exceeded. Please check your OpenAI plan and billing details.".to_owned()
            }
            TurnError::Generation(e) => format!("Failed to generate a reply: {e}"),
            TurnError::EmptyInput => "Please enter a message".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnInput {
    /// Record from the microphone for the session's recording duration.
    Voice,
    Upload(AudioClip),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnResult {
    /// What the transcriber heard; `None` for typed input.
    pub transcript: Option<String>,
    pub reply_text: String,
    /// `None` when synthesis failed. The text reply still stands.
    pub reply_audio: Option<SpeechAudio>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnConfig {
    pub tts_lang: LanguageCode,
}

impl TurnConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            tts_lang: app.tts_lang.clone(),
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            tts_lang: LanguageCode::default(),
        }
    }
}

pub struct TurnOrchestrator<C, T, G, S> {
    pub capture: C,
    pub transcriber: T,
    pub model: G,
    pub synthesizer: S,
    pub config: TurnConfig,
}

impl<C, T, G, S> TurnOrchestrator<C, T, G, S>
where
    C: AudioCapture,
    T: Transcriber,
    G: ChatModel,
    S: SpeechSynthesizer,
{
    pub fn new(capture: C, transcriber: T, model: G, synthesizer: S, config: TurnConfig) -> Self {
        Self {
            capture,
            transcriber,
            model,
            synthesizer,
            config,
        }
    }

    pub async fn run_turn(
        &self,
        input: TurnInput,
        session: &mut SessionState,
    ) -> Result<TurnResult, TurnError> {
        let (user_text, transcript) = match input {
            TurnInput::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(TurnError::EmptyInput);
                }
                (text.to_owned(), None)
            }
            TurnInput::Voice => {
                let duration = session.recording_duration();
                tracing::debug!(target: LOG_TARGET, secs = duration.secs(), "recording");
                let captured = self.capture.record(duration).await?;
                if captured.is_empty() {
                    return Err(CaptureError::NoAudio.into());
                }
                let clip = captured
                    .to_wav_clip()
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;
                let text = self.transcribe(clip).await?;
                (text.clone(), Some(text))
            }
            TurnInput::Upload(clip) => {
                let text = self.transcribe(clip).await?;
                (text.clone(), Some(text))
            }
        };

        let mode = session.mode();
        let request = session.history().request_with(profile(mode), &user_text);
        tracing::debug!(
            target: LOG_TARGET,
            mode = %mode,
            messages = request.len(),
            "generating reply"
        );
        let reply = self.model.generate(request).await?;
        let reply = reply.trim().to_owned();
        if reply.is_empty() {
            return Err(GenerationError::EmptyReply.into());
        }

        session
            .history_mut()
            .commit_exchange(user_text, reply.clone());
        tracing::info!(
            target: LOG_TARGET,
            mode = %mode,
            history_len = session.history().len(),
            "turn committed"
        );

        let reply_audio = match self
            .synthesizer
            .synthesize(TtsRequest::new(reply.clone(), self.config.tts_lang.clone()))
            .await
        {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "speech synthesis failed, replying with text only");
                None
            }
        };

        Ok(TurnResult {
            transcript,
            reply_text: reply,
            reply_audio,
        })
    }

    async fn transcribe(&self, clip: AudioClip) -> Result<String, TranscriptionError> {
        if clip.is_empty() {
            return Err(TranscriptionError::UnsupportedInput(
                "audio clip is empty".to_owned(),
            ));
        }
        let text = self.transcriber.transcribe(clip).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::EmptyTranscript);
        }
        tracing::debug!(target: LOG_TARGET, chars = text.chars().count(), "transcribed");
        Ok(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, CapturedAudio};
    use crate::config::RecordingDuration;
    use crate::conversation::{Message, Role};
    use crate::profile::Mode;
    use crate::session::SharedSession;
    use crate::tts::SynthesisError;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct StubCapture {
        fail: bool,
        silent: bool,
        requested: Mutex<Vec<u8>>,
    }

    impl AudioCapture for StubCapture {
        fn record(
            &self,
            duration: RecordingDuration,
        ) -> BoxFuture<'_, Result<CapturedAudio, CaptureError>> {
            self.requested.lock().unwrap().push(duration.secs());
            let out = if self.fail {
                Err(CaptureError::InputUnavailable("no microphone".into()))
            } else {
                let samples = if self.silent { Vec::new() } else { vec![0.1; 1600] };
                Ok(CapturedAudio {
                    sample_rate_hz: 16_000,
                    samples,
                })
            };
            async move { out }.boxed()
        }
    }

    struct StubTranscriber {
        text: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StubTranscriber {
        fn hears(text: &'static str) -> Self {
            Self {
                text: Some(text),
                calls: AtomicUsize::new(0),
            }
        }

        fn broken() -> Self {
            Self {
                text: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transcriber for StubTranscriber {
        fn transcribe(&self, _audio: AudioClip) -> BoxFuture<'_, Result<String, TranscriptionError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = match self.text {
                Some(t) => Ok(t.to_owned()),
                None => Err(TranscriptionError::Network("connection reset".into())),
            };
            async move { out }.boxed()
        }
    }

    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
        EchoAfter(Duration),
    }

    struct StubModel {
        reply: Reply,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl StubModel {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<Message>> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ChatModel for StubModel {
        fn generate(&self, messages: Vec<Message>) -> BoxFuture<'_, Result<String, GenerationError>> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.requests.lock().unwrap().push(messages);
            match self.reply {
                Reply::Text(t) => async move { Ok(t.to_owned()) }.boxed(),
                Reply::Fail => async { Err(GenerationError::Network("timeout".into())) }.boxed(),
                Reply::Hang => futures::future::pending().boxed(),
                Reply::EchoAfter(delay) => async move {
                    tokio::time::sleep(delay).await;
                    Ok(format!("re: {last}"))
                }
                .boxed(),
            }
        }
    }

    struct StubSynth {
        fail: bool,
    }

    impl SpeechSynthesizer for StubSynth {
        fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
            let out = if self.fail {
                Err(SynthesisError::Network("unreachable".into()))
            } else {
                Ok(AudioClip::new(AudioFormat::Mp3, request.text.into_bytes()))
            };
            async move { out }.boxed()
        }
    }

    type Orchestrator = TurnOrchestrator<
        Arc<StubCapture>,
        Arc<StubTranscriber>,
        Arc<StubModel>,
        StubSynth,
    >;

    fn orchestrator(
        capture: Arc<StubCapture>,
        transcriber: Arc<StubTranscriber>,
        model: Arc<StubModel>,
        synth_fails: bool,
    ) -> Orchestrator {
        TurnOrchestrator::new(
            capture,
            transcriber,
            model,
            StubSynth { fail: synth_fails },
            TurnConfig::default(),
        )
    }

    fn text_only(model: Arc<StubModel>) -> Orchestrator {
        orchestrator(
            Arc::new(StubCapture::default()),
            Arc::new(StubTranscriber::hears("unused")),
            model,
            false,
        )
    }

    fn wav_upload() -> TurnInput {
        TurnInput::Upload(AudioClip::new(AudioFormat::Wav, vec![1u8, 2, 3]))
    }

    #[tokio::test]
    async fn successful_turn_appends_user_then_assistant() {
        let model = Arc::new(StubModel::new(Reply::Text("Hello!")));
        let orch = text_only(model.clone());
        let mut session = SessionState::default();

        let result = orch
            .run_turn(TurnInput::Text("Hi there".into()), &mut session)
            .await
            .unwrap();

        assert_eq!(result.reply_text, "Hello!");
        assert_eq!(result.transcript, None);
        assert!(result.reply_audio.is_some());
        assert_eq!(
            session.history().messages(),
            &[Message::user("Hi there"), Message::assistant("Hello!")]
        );
    }

    #[tokio::test]
    async fn request_is_profile_then_history_then_user() {
        let model = Arc::new(StubModel::new(Reply::Text("We are open 9-5.")));
        let orch = text_only(model.clone());
        let mut session = SessionState::default();
        session
            .history_mut()
            .commit_exchange("Hi".into(), "Hello, how can I help?".into());

        orch.run_turn(TurnInput::Text("What are your hours?".into()), &mut session)
            .await
            .unwrap();

        let request = &model.requests()[0];
        assert_eq!(request.len(), 4);
        assert_eq!(request[0], Message::system(profile(Mode::CustomerService)));
        assert_eq!(request.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(request[3], Message::user("What are your hours?"));

        assert_eq!(session.history().len(), 4);
        assert_eq!(
            session.history().last(),
            Some(&Message::assistant("We are open 9-5."))
        );
    }

    #[tokio::test]
    async fn voice_turn_records_for_session_duration_and_reports_transcript() {
        let capture = Arc::new(StubCapture::default());
        let transcriber = Arc::new(StubTranscriber::hears("  I need help  "));
        let model = Arc::new(StubModel::new(Reply::Text("Sure.")));
        let orch = orchestrator(capture.clone(), transcriber, model, false);
        let mut session =
            SessionState::new(Mode::CustomerService, RecordingDuration::new(7).unwrap());

        let result = orch.run_turn(TurnInput::Voice, &mut session).await.unwrap();

        assert_eq!(*capture.requested.lock().unwrap(), vec![7]);
        assert_eq!(result.transcript.as_deref(), Some("I need help"));
        assert_eq!(session.history().messages()[0], Message::user("I need help"));
    }

    #[tokio::test]
    async fn failed_recording_leaves_history_untouched() {
        let capture = Arc::new(StubCapture {
            fail: true,
            ..StubCapture::default()
        });
        let transcriber = Arc::new(StubTranscriber::hears("never"));
        let model = Arc::new(StubModel::new(Reply::Text("never")));
        let orch = orchestrator(capture.clone(), transcriber.clone(), model.clone(), false);
        let mut session =
            SessionState::new(Mode::CustomerService, RecordingDuration::new(3).unwrap());
        let before = session.clone();

        let err = orch.run_turn(TurnInput::Voice, &mut session).await.unwrap_err();

        assert!(matches!(err, TurnError::Capture(_)));
        assert!(err.user_notice().starts_with("Recording failed"));
        assert_eq!(*capture.requested.lock().unwrap(), vec![3]);
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
        assert!(model.requests().is_empty());
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn empty_recording_is_a_capture_error() {
        let capture = Arc::new(StubCapture {
            silent: true,
            ..StubCapture::default()
        });
        let transcriber = Arc::new(StubTranscriber::hears("phantom words"));
        let model = Arc::new(StubModel::new(Reply::Text("ok")));
        let orch = orchestrator(capture, transcriber.clone(), model.clone(), false);
        let mut session =
            SessionState::new(Mode::CustomerService, RecordingDuration::new(3).unwrap());
        let before = session.clone();

        let err = orch.run_turn(TurnInput::Voice, &mut session).await.unwrap_err();

        assert!(matches!(err, TurnError::Capture(CaptureError::NoAudio)));
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
        assert!(model.requests().is_empty());
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn transcription_failure_leaves_history_untouched() {
        let model = Arc::new(StubModel::new(Reply::Text("never")));
        let orch = orchestrator(
            Arc::new(StubCapture::default()),
            Arc::new(StubTranscriber::broken()),
            model.clone(),
            false,
        );
        let mut session = SessionState::default();
        session
            .history_mut()
            .commit_exchange("Hi".into(), "Hello".into());
        let before = session.clone();

        let err = orch.run_turn(wav_upload(), &mut session).await.unwrap_err();

        assert!(matches!(err, TurnError::Transcription(_)));
        assert!(model.requests().is_empty());
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn blank_transcript_is_an_empty_transcript_error() {
        let model = Arc::new(StubModel::new(Reply::Text("never")));
        let orch = orchestrator(
            Arc::new(StubCapture::default()),
            Arc::new(StubTranscriber::hears(" \n\t ")),
            model.clone(),
            false,
        );
        let mut session = SessionState::default();

        let err = orch.run_turn(wav_upload(), &mut session).await.unwrap_err();

        assert!(matches!(
            err,
            TurnError::Transcription(TranscriptionError::EmptyTranscript)
        ));
        assert!(model.requests().is_empty());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_transcription() {
        let transcriber = Arc::new(StubTranscriber::hears("never"));
        let orch = orchestrator(
            Arc::new(StubCapture::default()),
            transcriber.clone(),
            Arc::new(StubModel::new(Reply::Text("never"))),
            false,
        );
        let mut session = SessionState::default();

        let err = orch
            .run_turn(
                TurnInput::Upload(AudioClip::new(AudioFormat::Mp3, Vec::<u8>::new())),
                &mut session,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TurnError::Transcription(TranscriptionError::UnsupportedInput(_))
        ));
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generation_failure_rolls_back() {
        let orch = text_only(Arc::new(StubModel::new(Reply::Fail)));
        let mut session = SessionState::default();
        session
            .history_mut()
            .commit_exchange("Hi".into(), "Hello".into());
        let before = session.clone();

        let err = orch
            .run_turn(TurnInput::Text("Are you there?".into()), &mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::Generation(_)));
        assert_eq!(session, before);
        assert_eq!(session.history().len() % 2, 0);
    }

    #[tokio::test]
    async fn blank_reply_is_a_generation_error() {
        let orch = text_only(Arc::new(StubModel::new(Reply::Text("   "))));
        let mut session = SessionState::default();

        let err = orch
            .run_turn(TurnInput::Text("Hello".into()), &mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::Generation(GenerationError::EmptyReply)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn synthesis_failure_still_delivers_text_reply() {
        let orch = orchestrator(
            Arc::new(StubCapture::default()),
            Arc::new(StubTranscriber::hears("unused")),
            Arc::new(StubModel::new(Reply::Text("Thanks for calling."))),
            true,
        );
        let mut session = SessionState::default();

        let result = orch
            .run_turn(TurnInput::Text("Bye".into()), &mut session)
            .await
            .unwrap();

        assert_eq!(result.reply_text, "Thanks for calling.");
        assert!(result.reply_audio.is_none());
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_a_model_call() {
        let model = Arc::new(StubModel::new(Reply::Text("never")));
        let orch = text_only(model.clone());
        let mut session = SessionState::default();

        let err = orch
            .run_turn(TurnInput::Text("   ".into()), &mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::EmptyInput));
        assert!(model.requests().is_empty());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn mode_switch_only_changes_next_system_prompt() {
        let model = Arc::new(StubModel::new(Reply::Text("ok")));
        let orch = text_only(model.clone());
        let mut session = SessionState::default();

        orch.run_turn(TurnInput::Text("one".into()), &mut session)
            .await
            .unwrap();
        let before = session.history().clone();
        session.set_mode(Mode::LeadGeneration);
        assert_eq!(session.history(), &before);

        orch.run_turn(TurnInput::Text("two".into()), &mut session)
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests[0][0], Message::system(profile(Mode::CustomerService)));
        assert_eq!(requests[1][0], Message::system(profile(Mode::LeadGeneration)));
        assert_eq!(&requests[1][1..3], before.messages());
    }

    #[tokio::test]
    async fn dropped_turn_leaves_session_unchanged() {
        let orch = text_only(Arc::new(StubModel::new(Reply::Hang)));
        let mut session = SessionState::default();
        session
            .history_mut()
            .commit_exchange("Hi".into(), "Hello".into());
        let before = session.clone();

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            orch.run_turn(TurnInput::Text("Still there?".into()), &mut session),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(session, before);
    }

    async fn locked_turn(
        orch: &Orchestrator,
        shared: &SharedSession,
        text: &str,
    ) -> Result<TurnResult, TurnError> {
        let mut session = shared.lock().await;
        orch.run_turn(TurnInput::Text(text.into()), &mut session).await
    }

    #[tokio::test]
    async fn turns_on_a_shared_session_run_one_at_a_time() {
        let model = Arc::new(StubModel::new(Reply::EchoAfter(Duration::from_millis(20))));
        let orch = text_only(model.clone());
        let shared: SharedSession = Arc::new(tokio::sync::Mutex::new(SessionState::default()));

        let (first, second) = tokio::join!(
            locked_turn(&orch, &shared, "first"),
            locked_turn(&orch, &shared, "second"),
        );
        first.unwrap();
        second.unwrap();

        let session = shared.lock().await;
        let messages = session.history().messages();
        assert_eq!(messages.len(), 4);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("re: {}", pair[0].content));
        }

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), requests[0].len() + 2);
    }

    #[test]
    fn quota_notice_mentions_billing() {
        let err = TurnError::from(GenerationError::QuotaExceeded("insufficient_quota".into()));
        assert!(err.user_notice().contains("billing"));
    }
}
