use crate::conversation::{ConversationHistory, Message};
use crate::llm::{ChatModel, GenerationError};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "analysis";

const ANALYST_PROMPT: &str = "You are a professional conversation analysis expert, \
capable of extracting key information from conversations.";

const ANALYSIS_INSTRUCTION: &str = "\
Please analyze the following conversation and extract the following information:
1. Customer's main issues or needs
2. Customer's emotional state
3. Key information points (such as product interest, budget considerations, etc.)
4. Suggested follow-up actions

Conversation content:";

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("conversation history is empty")]
    EmptyHistory,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// The model's free-form analysis. No structure is imposed on it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisReport {
    pub free_text: String,
}

pub struct ConversationAnalyzer<G> {
    model: G,
}

impl<G: ChatModel> ConversationAnalyzer<G> {
    pub fn new(model: G) -> Self {
        Self { model }
    }

    /// Summarizes a finished or ongoing conversation. Reads the history
    /// only; the request never goes through the session's mode profile.
    pub async fn analyze(
        &self,
        history: &ConversationHistory,
    ) -> Result<AnalysisReport, AnalysisError> {
        if history.is_empty() {
            return Err(AnalysisError::EmptyHistory);
        }

        let request = analysis_request(history);
        tracing::info!(target: LOG_TARGET, messages = history.len(), "analyzing conversation");
        let free_text = self.model.generate(request).await?;
        Ok(AnalysisReport {
            free_text: free_text.trim().to_owned(),
        })
    }
}

fn analysis_request(history: &ConversationHistory) -> Vec<Message> {
    let mut prompt = String::from(ANALYSIS_INSTRUCTION);
    for line in history.transcript_lines() {
        prompt.push('\n');
        prompt.push_str(&line);
    }
    vec![Message::system(ANALYST_PROMPT), Message::user(prompt)]
}
