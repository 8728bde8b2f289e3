use std::path::PathBuf;
use voice_assistant_core::assistant::{Action, NoticeLevel, Outcome};
use voice_assistant_core::conversation::Role;
use voice_assistant_core::profile::Mode;

pub const HELP: &str = "\
Commands:
  /record                 record from the microphone and reply
  /upload <path>          transcribe a .wav or .mp3 file and reply
  /mode <mode>            customer_service | lead_generation
  /duration <3-15>        recording length in seconds
  /clear                  clear the conversation history
  /analyze                analyze the conversation so far
  /history                print the conversation history
  /help                   show this help
  /quit                   exit
Any other line is sent to the assistant as text.";

#[derive(Debug, PartialEq)]
pub enum Command {
    Dispatch(Action),
    Upload(PathBuf),
    Help,
    Quit,
    Nothing,
}

pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Nothing);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Dispatch(Action::SubmitText(line.to_owned())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "record" | "r" => Command::Dispatch(Action::StartRecording),
        "upload" | "u" => {
            if arg.is_empty() {
                return Err("usage: /upload <path to .wav or .mp3>".to_owned());
            }
            Command::Upload(PathBuf::from(arg))
        }
        "mode" | "m" => {
            let mode: Mode = arg.parse().map_err(|e| format!("{e}"))?;
            Command::Dispatch(Action::SwitchMode(mode))
        }
        "duration" | "d" => {
            let secs: u8 = arg
                .parse()
                .map_err(|_| "usage: /duration <3-15>".to_owned())?;
            Command::Dispatch(Action::SetRecordingDuration(secs))
        }
        "clear" => Command::Dispatch(Action::ClearHistory),
        "analyze" | "analyse" => Command::Dispatch(Action::Analyze),
        "history" | "h" => Command::Dispatch(Action::ShowHistory),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(command)
}

/// Writes an outcome for the terminal. Reply audio is handled by the caller.
pub fn render(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Reply(result) => {
            let mut out = String::new();
            if let Some(transcript) = &result.transcript {
                out.push_str(&format!("Transcription: {transcript}\n"));
            }
            out.push_str(&format!("Assistant: {}", result.reply_text));
            if result.reply_audio.is_none() {
                out.push_str("\n(no audio for this reply)");
            }
            out
        }
        Outcome::ModeSwitched(mode) => format!("Switched to {}", mode.label()),
        Outcome::DurationSet(d) => format!("Recording duration set to {}s", d.secs()),
        Outcome::HistoryCleared => "Conversation history cleared".to_owned(),
        Outcome::Analysis(report) => format!("Conversation analysis:\n{}", report.free_text),
        Outcome::History(messages) if messages.is_empty() => {
            "Conversation history is empty".to_owned()
        }
        Outcome::History(messages) => messages
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "You",
                    Role::Assistant | Role::System => "Assistant",
                };
                format!("{who}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Outcome::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            format!("[{tag}] {}", notice.message)
        }
    }
}
