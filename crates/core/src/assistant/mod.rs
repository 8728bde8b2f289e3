//! The UI-facing boundary. Every user action goes through
//! [`Assistant::dispatch`] and comes back as an [`Outcome`]; failures are
//! turned into notices here and never escape as errors.

use crate::analysis::{AnalysisError, AnalysisReport, ConversationAnalyzer};
use crate::asr::Transcriber;
use crate::audio::{AudioClip, AudioFormat};
use crate::capture::AudioCapture;
use crate::config::RecordingDuration;
use crate::conversation::Message;
use crate::llm::ChatModel;
use crate::profile::Mode;
use crate::session::SessionState;
use crate::tts::SpeechSynthesizer;
use crate::turn::{TurnInput, TurnOrchestrator, TurnResult};
use bytes::Bytes;
use serde::Serialize;

const LOG_TARGET: &str = "assistant";

pub const EMPTY_HISTORY_NOTICE: &str = "Conversation history is empty, cannot perform analysis";

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    StartRecording,
    UploadAudio { bytes: Bytes, extension: String },
    SubmitText(String),
    SwitchMode(Mode),
    SetRecordingDuration(u8),
    ClearHistory,
    Analyze,
    ShowHistory,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Reply(TurnResult),
    ModeSwitched(Mode),
    DurationSet(RecordingDuration),
    HistoryCleared,
    Analysis(AnalysisReport),
    History(Vec<Message>),
    Notice(Notice),
}

pub struct Assistant<C, T, G, S> {
    orchestrator: TurnOrchestrator<C, T, G, S>,
    analyzer: ConversationAnalyzer<G>,
    session: SessionState,
}

impl<C, T, G, S> Assistant<C, T, G, S>
where
    C: AudioCapture,
    T: Transcriber,
    G: ChatModel + Clone,
    S: SpeechSynthesizer,
{
    /// The analyzer shares the orchestrator's chat model.
    pub fn new(orchestrator: TurnOrchestrator<C, T, G, S>, session: SessionState) -> Self {
        let analyzer = ConversationAnalyzer::new(orchestrator.model.clone());
        Self {
            orchestrator,
            analyzer,
            session,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub async fn dispatch(&mut self, action: Action) -> Outcome {
        match action {
            Action::StartRecording => self.turn(TurnInput::Voice).await,
            Action::UploadAudio { bytes, extension } => {
                match AudioFormat::from_extension(&extension) {
                    Ok(format) => {
                        self.turn(TurnInput::Upload(AudioClip::new(format, bytes)))
                            .await
                    }
                    Err(e) => Outcome::Notice(Notice::error(format!("Upload rejected: {e}"))),
                }
            }
            Action::SubmitText(text) => self.turn(TurnInput::Text(text)).await,
            Action::SwitchMode(mode) => {
                self.session.set_mode(mode);
                Outcome::ModeSwitched(mode)
            }
            Action::SetRecordingDuration(secs) => match RecordingDuration::new(secs) {
                Ok(duration) => {
                    self.session.set_recording_duration(duration);
                    Outcome::DurationSet(duration)
                }
                Err(e) => Outcome::Notice(Notice::warning(e.to_string())),
            },
            Action::ClearHistory => {
                self.session.clear_history();
                Outcome::HistoryCleared
            }
            Action::Analyze => match self.analyzer.analyze(self.session.history()).await {
                Ok(report) => Outcome::Analysis(report),
                Err(AnalysisError::EmptyHistory) => {
                    Outcome::Notice(Notice::info(EMPTY_HISTORY_NOTICE))
                }
                Err(AnalysisError::Generation(e)) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "analysis failed");
                    Outcome::Notice(Notice::error(format!("Analysis failed: {e}")))
                }
            },
            Action::ShowHistory => Outcome::History(self.session.history().messages().to_vec()),
        }
    }

    async fn turn(&mut self, input: TurnInput) -> Outcome {
        match self.orchestrator.run_turn(input, &mut self.session).await {
            Ok(result) => Outcome::Reply(result),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "turn failed");
                Outcome::Notice(Notice::error(e.user_notice()))
            }
        }
    }
}
