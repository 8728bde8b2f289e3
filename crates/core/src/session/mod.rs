mod registry;

use crate::config::RecordingDuration;
use crate::conversation::ConversationHistory;
use crate::profile::Mode;
use serde::Serialize;

pub use registry::{SessionId, SessionRegistry, SharedSession};

/// State of one interactive session. Lives for the life of the process (or
/// of its registry entry) and is passed explicitly into every turn.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct SessionState {
    history: ConversationHistory,
    mode: Mode,
    recording_duration: RecordingDuration,
}

impl SessionState {
    pub fn new(mode: Mode, recording_duration: RecordingDuration) -> Self {
        Self {
            history: ConversationHistory::new(),
            mode,
            recording_duration,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut ConversationHistory {
        &mut self.history
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn recording_duration(&self) -> RecordingDuration {
        self.recording_duration
    }

    /// Only affects later turns; stored history is kept as is.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            tracing::info!(from = %self.mode, to = %mode, "mode switched");
        }
        self.mode = mode;
    }

    pub fn set_recording_duration(&mut self, duration: RecordingDuration) {
        self.recording_duration = duration;
    }

    pub fn clear_history(&mut self) {
        tracing::info!(cleared = self.history.len(), "conversation history cleared");
        self.history.clear();
    }
}
